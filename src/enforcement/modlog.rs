//! Moderation log
//!
//! Optional record of every kick, posted to a chat bridge. When no sink is
//! configured the enforcer simply skips this step.

use crate::error::AutomodResult;
use crate::vetting::{PlayerIdentity, ReasonCode, Verdict};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, CreateEmbed, CreateEmbedAuthor, CreateMessage, Http};
use std::sync::Arc;
use tracing::info;

/// Title used for every moderation-log post
pub const MOD_LOG_TITLE: &str = "AutoMod";

/// A single moderation-log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModLogEntry {
    pub title: String,
    pub player_name: String,
    pub xuid: String,
    pub reason: ReasonCode,
    /// Kick message shown to the player
    pub message: String,
    /// Device the player reported
    pub supposed_device: String,
    /// Banned platform found in their history, for spoofing kicks
    pub real_device: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ModLogEntry {
    /// Build an entry for a denial; `None` for an admit
    #[must_use]
    pub fn from_verdict(player: &PlayerIdentity, verdict: &Verdict, timestamp: DateTime<Utc>) -> Option<Self> {
        let denial = verdict.denial()?;
        Some(Self {
            title: MOD_LOG_TITLE.to_string(),
            player_name: player.name.clone(),
            xuid: player.xuid.clone(),
            reason: denial.reason,
            message: denial.message.clone(),
            supposed_device: player.device.clone(),
            real_device: denial.context.detected_platform.clone(),
            timestamp,
        })
    }

    /// Markdown body of the post
    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "**Reason:** {}\n**User:** {}\n**XUID:** {}\n**Time:** <t:{}>\n**Supposed Device:** {}\n**Real Device:** {}",
            self.message,
            self.player_name,
            self.xuid,
            self.timestamp.timestamp(),
            self.supposed_device,
            self.real_device.as_deref().unwrap_or("Unknown"),
        )
    }
}

/// Destination for moderation-log records
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ModerationLogSink: Send + Sync {
    async fn post(&self, entry: &ModLogEntry) -> AutomodResult<()>;
}

/// Posts moderation-log records as Discord embeds
pub struct DiscordModLog {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordModLog {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }

    /// Embed for a record
    #[must_use]
    pub fn embed(entry: &ModLogEntry) -> CreateEmbed {
        CreateEmbed::new()
            .title(&entry.title)
            .author(CreateEmbedAuthor::new(&entry.player_name))
            .description(entry.description())
            .field("Reason Code", entry.reason.to_string(), true)
            .timestamp(entry.timestamp)
    }
}

#[async_trait::async_trait]
impl ModerationLogSink for DiscordModLog {
    async fn post(&self, entry: &ModLogEntry) -> AutomodResult<()> {
        self.channel_id
            .send_message(self.http.as_ref(), CreateMessage::new().embed(Self::embed(entry)))
            .await?;
        info!(
            "Posted AutoMod log for {} to channel {}",
            entry.xuid, self.channel_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KickMessages;
    use crate::vetting::{Denial, DenialContext};
    use chrono::TimeZone;

    fn spoofing_verdict() -> Verdict {
        Verdict::Deny(Denial::new(
            ReasonCode::DeviceSpoofing,
            DenialContext {
                device: Some("Android".to_string()),
                detected_platform: Some("Windows".to_string()),
                ..Default::default()
            },
            &KickMessages::default(),
        ))
    }

    #[test]
    fn test_entry_from_admit_is_none() {
        let player = PlayerIdentity::new("1", "Steve", "Android");
        assert!(ModLogEntry::from_verdict(&player, &Verdict::Admit, Utc::now()).is_none());
    }

    #[test]
    fn test_entry_description() {
        let player = PlayerIdentity::new("2535400000000001", "Steve", "Android");
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let entry = ModLogEntry::from_verdict(&player, &spoofing_verdict(), timestamp)
            .expect("entry");

        assert_eq!(entry.title, "AutoMod");
        assert_eq!(entry.reason, ReasonCode::DeviceSpoofing);
        let description = entry.description();
        assert!(description.contains("**Reason:** Device spoofing detected."));
        assert!(description.contains("**User:** Steve"));
        assert!(description.contains("**XUID:** 2535400000000001"));
        assert!(description.contains(&format!("<t:{}>", timestamp.timestamp())));
        assert!(description.contains("**Supposed Device:** Android"));
        assert!(description.contains("**Real Device:** Windows"));
    }

    #[test]
    fn test_real_device_unknown_when_not_detected() {
        let player = PlayerIdentity::new("1", "Steve", "Windows");
        let verdict = Verdict::Deny(Denial::new(
            ReasonCode::BannedDevice,
            DenialContext {
                device: Some("Windows".to_string()),
                ..Default::default()
            },
            &KickMessages::default(),
        ));
        let entry = ModLogEntry::from_verdict(&player, &verdict, Utc::now()).expect("entry");
        assert!(entry.description().contains("**Real Device:** Unknown"));
    }
}
