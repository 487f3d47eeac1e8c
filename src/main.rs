use std::{env, sync::Arc};

use poise::serenity_prelude::{self as serenity, ChannelId, Http};
use realm_automod::admin::WhitelistAdmin;
use realm_automod::config::Config;
use realm_automod::enforcement::{DiscordModLog, Enforcer};
use realm_automod::host::StdioHost;
use realm_automod::plugin::{AutoMod, HostEvent};
use realm_automod::vetting::Vetter;
use realm_automod::xbox::{FileTokenProvider, XboxLiveClient};
use realm_automod::{BOT_NAME, CONSOLE_TARGET, Data, ERROR_TARGET, Error, commands, handlers, logging};
use serenity::GatewayIntents;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Start the Discord bridge: admin commands plus the moderation-log client.
///
/// Returns the HTTP handle moderation logs are posted through.
async fn start_discord(config: Arc<Config>, admin: WhitelistAdmin) -> Result<Arc<Http>, Error> {
    let token = env::var("DISCORD_TOKEN")
        .map_err(|_| "DISCORD_TOKEN must be set when Discord is enabled")?;
    let log_channel = config.discord.log_channel().map(ChannelId::new);
    let data = Data::new(config, admin);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::whitelist(), commands::unwhitelist()],
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering whitelist commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler { log_channel })
        .framework(framework)
        .await?;
    let http = Arc::clone(&client.http);

    tokio::spawn(async move {
        if let Err(err) = client.start().await {
            error!(target: ERROR_TARGET, error = %err, "Discord client stopped");
        }
    });

    Ok(http)
}

/// Main function to run the automod
async fn async_main() -> Result<(), Error> {
    logging::init()?;
    info!(target: CONSOLE_TARGET, "Starting {BOT_NAME}...");

    let config = Arc::new(Config::load(&Config::path_from_env()).await?);
    let allow_list = AutoMod::on_loaded(&config).await?;

    let tokens = Arc::new(FileTokenProvider::new(config.token_path()));
    let xbox = Arc::new(XboxLiveClient::new(tokens, config.fetch_timeout())?);
    let host = Arc::new(StdioHost::new());
    let admin = WhitelistAdmin::new(xbox.clone(), allow_list.clone());

    let mut enforcer = Enforcer::new(host.clone());
    if config.xbox_message {
        enforcer = enforcer.with_messenger(xbox.clone());
    }
    if config.discord.enabled {
        let http = start_discord(Arc::clone(&config), admin.clone()).await?;
        if let Some(channel_id) = config.discord.log_channel() {
            enforcer = enforcer.with_mod_log(Arc::new(DiscordModLog::new(
                http,
                ChannelId::new(channel_id),
            )));
        }
    }

    let vetter = Vetter::new(Arc::clone(&config), xbox, allow_list);
    let plugin = Arc::new(AutoMod::new(vetter, enforcer, admin, host.clone()));

    let (tx, rx) = mpsc::channel::<HostEvent>(100);

    let reader_tx = tx.clone();
    tokio::spawn(async move {
        host.read_events(BufReader::new(tokio::io::stdin()), reader_tx)
            .await;
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(HostEvent::Shutdown).await;
        }
    });

    plugin.run(rx).await;
    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::from)
        .and_then(|runtime| runtime.block_on(async_main()));

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
