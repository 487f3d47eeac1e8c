//! Whitelist administration
//!
//! Operator commands resolve a gamertag through the identity provider and
//! mutate the whitelist directly. They never go through vetting.

use crate::allowlist::AllowList;
use crate::error::{AutomodError, AutomodResult};
use crate::{CONSOLE_TARGET, ERROR_TARGET};
use derive_more::Display;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Resolves gamertags to XUIDs
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GamertagResolver: Send + Sync {
    async fn resolve_gamertag(&self, gamertag: &str) -> AutomodResult<String>;
}

/// Result of a whitelist command
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum AdminOutcome {
    #[display("{gamertag} has been whitelisted!")]
    Added { gamertag: String, xuid: String },
    #[display("{gamertag} has already been whitelisted!")]
    AlreadyPresent { gamertag: String, xuid: String },
    #[display("{gamertag}'s whitelist has been removed!")]
    Removed { gamertag: String, xuid: String },
    #[display("{gamertag} is not yet whitelisted!")]
    NotPresent { gamertag: String, xuid: String },
}

impl AdminOutcome {
    /// Whether the command changed the whitelist
    #[must_use]
    pub fn changed(&self) -> bool {
        matches!(self, Self::Added { .. } | Self::Removed { .. })
    }
}

/// Operator console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Whitelist(String),
    Unwhitelist(String),
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse a console line. Returns `None` for a blank line.
    ///
    /// The remaining words are joined back together so gamertags with spaces
    /// work without quoting.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        let gamertag = words.collect::<Vec<_>>().join(" ");

        Some(match command.to_ascii_lowercase().as_str() {
            "whitelist" | "w" => Self::Whitelist(gamertag),
            "unwhitelist" | "uw" => Self::Unwhitelist(gamertag),
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Whitelist / unwhitelist commands
#[derive(Clone)]
pub struct WhitelistAdmin {
    resolver: Arc<dyn GamertagResolver>,
    allow_list: AllowList,
}

impl WhitelistAdmin {
    pub fn new(resolver: Arc<dyn GamertagResolver>, allow_list: AllowList) -> Self {
        Self {
            resolver,
            allow_list,
        }
    }

    #[must_use]
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    async fn resolve(&self, gamertag: &str) -> AutomodResult<String> {
        let gamertag = gamertag.trim();
        if gamertag.is_empty() {
            return Err(AutomodError::InvalidArgument(
                "Gamertag has not been specified!".to_string(),
            ));
        }
        self.resolver.resolve_gamertag(gamertag).await
    }

    /// Whitelist a player by gamertag
    ///
    /// # Errors
    ///
    /// Returns an error if the gamertag is empty or cannot be resolved, or if
    /// the whitelist cannot be saved. The whitelist is unchanged on error.
    pub async fn whitelist(&self, gamertag: &str) -> AutomodResult<AdminOutcome> {
        let xuid = self.resolve(gamertag).await?;
        let gamertag = gamertag.trim().to_string();
        if self.allow_list.add(&xuid).await? {
            Ok(AdminOutcome::Added { gamertag, xuid })
        } else {
            Ok(AdminOutcome::AlreadyPresent { gamertag, xuid })
        }
    }

    /// Remove a player's whitelist entry by gamertag
    ///
    /// # Errors
    ///
    /// Returns an error if the gamertag is empty or cannot be resolved, or if
    /// the whitelist cannot be saved. The whitelist is unchanged on error.
    pub async fn unwhitelist(&self, gamertag: &str) -> AutomodResult<AdminOutcome> {
        let xuid = self.resolve(gamertag).await?;
        let gamertag = gamertag.trim().to_string();
        if self.allow_list.remove(&xuid).await? {
            Ok(AdminOutcome::Removed { gamertag, xuid })
        } else {
            Ok(AdminOutcome::NotPresent { gamertag, xuid })
        }
    }

    /// Run a console line and report the result on the operator console
    pub async fn handle_console_line(&self, line: &str) {
        let Some(command) = ConsoleCommand::parse(line) else {
            return;
        };

        let (action, gamertag, result) = match command {
            ConsoleCommand::Whitelist(gamertag) => {
                let result = self.whitelist(&gamertag).await;
                ("whitelist", gamertag, result)
            }
            ConsoleCommand::Unwhitelist(gamertag) => {
                let result = self.unwhitelist(&gamertag).await;
                ("unwhitelist", gamertag, result)
            }
            ConsoleCommand::Unknown(name) => {
                warn!(target: CONSOLE_TARGET, "Unknown command: {name}. Try whitelist <gamertag> or unwhitelist <gamertag>");
                return;
            }
        };

        match result {
            Ok(outcome) if outcome.changed() => info!(target: CONSOLE_TARGET, "{outcome}"),
            Ok(outcome) => warn!(target: CONSOLE_TARGET, "{outcome}"),
            Err(AutomodError::InvalidArgument(message)) => {
                error!(target: CONSOLE_TARGET, "{message}");
            }
            Err(e) => {
                error!(
                    target: ERROR_TARGET,
                    command = action,
                    gamertag = %gamertag,
                    error_kind = e.kind(),
                    error = %e,
                    "An error occurred while trying to {action} {gamertag}"
                );
            }
        }
    }
}
