//! Verdict enforcement
//!
//! Turns a denial into a host kick command, then runs the optional
//! notification channels. The kick is the only step whose failure is
//! reported to the caller; the rest are best effort and only logged.

use crate::enforcement::{ModLogEntry, ModerationLogSink};
use crate::error::AutomodResult;
use crate::vetting::{PlayerIdentity, Verdict};
use crate::ERROR_TARGET;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Executes commands on the game host
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HostCommandSink: Send + Sync {
    async fn execute_command(&self, command: &str) -> AutomodResult<()>;
}

/// Sends a direct message to a player
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DirectMessenger: Send + Sync {
    async fn send_message(&self, xuid: &str, text: &str) -> AutomodResult<()>;
}

/// Host command that kicks `xuid` with `reason`
#[must_use]
pub fn kick_command(xuid: &str, reason: &str) -> String {
    let reason = reason.replace('\\', "\\\\").replace('"', "\\\"");
    format!("kick \"{xuid}\" \"{reason}\"")
}

/// Applies verdicts
#[derive(Clone)]
pub struct Enforcer {
    host: Arc<dyn HostCommandSink>,
    messenger: Option<Arc<dyn DirectMessenger>>,
    mod_log: Option<Arc<dyn ModerationLogSink>>,
}

impl Enforcer {
    pub fn new(host: Arc<dyn HostCommandSink>) -> Self {
        Self {
            host,
            messenger: None,
            mod_log: None,
        }
    }

    /// Also message kicked players directly
    #[must_use]
    pub fn with_messenger(mut self, messenger: Arc<dyn DirectMessenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }

    /// Also post every kick to a moderation log
    #[must_use]
    pub fn with_mod_log(mut self, mod_log: Arc<dyn ModerationLogSink>) -> Self {
        self.mod_log = Some(mod_log);
        self
    }

    /// Carry out a verdict. Admits are a no-op.
    ///
    /// # Errors
    ///
    /// Returns the host error if the kick command could not be issued.
    pub async fn apply(&self, player: &PlayerIdentity, verdict: &Verdict) -> AutomodResult<()> {
        let Verdict::Deny(denial) = verdict else {
            return Ok(());
        };

        self.host
            .execute_command(&kick_command(&player.xuid, &denial.message))
            .await?;
        info!(
            xuid = %player.xuid,
            name = %player.name,
            reason = %denial.reason,
            event = "kick",
            "Kicked player"
        );

        if let Some(messenger) = &self.messenger {
            if let Err(e) = messenger.send_message(&player.xuid, &denial.message).await {
                error!(
                    target: ERROR_TARGET,
                    xuid = %player.xuid,
                    error = %e,
                    "Failed to message kicked player"
                );
            }
        }

        if let Some(mod_log) = &self.mod_log {
            if let Some(entry) = ModLogEntry::from_verdict(player, verdict, Utc::now()) {
                if let Err(e) = mod_log.post(&entry).await {
                    error!(
                        target: ERROR_TARGET,
                        xuid = %player.xuid,
                        error = %e,
                        "Failed to post AutoMod log"
                    );
                }
            }
        }

        Ok(())
    }
}
