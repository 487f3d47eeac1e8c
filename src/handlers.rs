use crate::EVENT_TARGET;
use poise::serenity_prelude::{self as serenity, ChannelId, Context, EventHandler, GuildId, Ready};
use tracing::{info, warn};

/// Discord gateway events for the moderation-log bridge
pub struct Handler {
    /// Channel moderation logs are posted to
    pub log_channel: Option<ChannelId>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected to Discord as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count = guilds.len();
        info!(target: EVENT_TARGET, "Discord cache ready, in {guild_count} guild(s)");

        let Some(channel_id) = self.log_channel else {
            return;
        };
        if ctx.cache.channel(channel_id).is_none() {
            warn!(
                target: EVENT_TARGET,
                "AutoMod log channel {channel_id} is not visible to the bot; logs may fail to post"
            );
        }
    }
}
