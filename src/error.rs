//! Error types for the automod
//!
//! This module defines the errors that can occur while vetting players,
//! talking to Xbox Live, or maintaining the whitelist.

use thiserror::Error;

/// Errors that can occur during automod operations
#[derive(Debug, Error)]
pub enum AutomodError {
    /// Credential or token acquisition failed, or the provider rejected it
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Transport failure, timeout, or unexpected provider response
    #[error("Network error: {0}")]
    Network(String),

    /// Provider throttling
    #[error("Rate limited by provider (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Whitelist read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Gamertag did not resolve to a player
    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    /// Operator supplied a bad argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The game host rejected or could not receive a command
    #[error("Host error: {0}")]
    Host(String),

    /// Discord API error
    #[error("Discord API error: {0}")]
    Discord(#[from] Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for AutomodError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::Discord(Box::new(error))
    }
}

impl From<reqwest::Error> for AutomodError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl AutomodError {
    /// Short label of the error kind, used as a structured log field
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Network(_) => "network",
            Self::RateLimited { .. } => "rate_limit",
            Self::Config(_) => "config",
            Self::Persistence(_) => "persistence",
            Self::PlayerNotFound(_) => "player_not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Host(_) => "host",
            Self::Discord(_) => "discord",
        }
    }
}

/// Result type for automod operations
pub type AutomodResult<T> = Result<T, AutomodError>;
