use crate::admin::AdminOutcome;
use crate::error::AutomodResult;
use crate::{CONSOLE_TARGET, Context, Error};
use poise::command;
use tracing::info;

/// Reply with the outcome, or the error and hand it on to the error hook
async fn report(ctx: Context<'_>, result: AutomodResult<AdminOutcome>) -> Result<(), Error> {
    match result {
        Ok(outcome) => {
            info!(
                target: CONSOLE_TARGET,
                user_id = %ctx.author().id,
                "{outcome}"
            );
            ctx.say(outcome.to_string()).await?;
            Ok(())
        }
        Err(e) => {
            ctx.say(format!("An error occurred: {e}")).await?;
            Err(e.into())
        }
    }
}

/// Whitelist a player so AutoMod never kicks them
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    aliases("w")
)]
pub async fn whitelist(
    ctx: Context<'_>,
    #[description = "Gamertag of the player"]
    #[rest]
    gamertag: String,
) -> Result<(), Error> {
    let result = ctx.data().admin.whitelist(&gamertag).await;
    report(ctx, result).await
}

/// Remove a player from the AutoMod whitelist
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    aliases("uw")
)]
pub async fn unwhitelist(
    ctx: Context<'_>,
    #[description = "Gamertag of the player"]
    #[rest]
    gamertag: String,
) -> Result<(), Error> {
    let result = ctx.data().admin.unwhitelist(&gamertag).await;
    report(ctx, result).await
}
