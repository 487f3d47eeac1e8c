//! Player identity and identity-provider signals

use crate::error::AutomodResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A connected player as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    /// Xbox user ID, the immutable key used everywhere
    pub xuid: String,
    /// Gamertag / display name
    pub name: String,
    /// Client device category reported on connect
    pub device: String,
}

impl PlayerIdentity {
    pub fn new(xuid: impl Into<String>, name: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            xuid: xuid.into(),
            name: name.into(),
            device: device.into(),
        }
    }
}

/// One entry of a player's title-play history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRecord {
    /// Title name, e.g. `Minecraft for Windows`
    pub name: String,
    /// `None` when the provider reported no play time; such an entry is
    /// treated as recent
    pub last_played: Option<DateTime<Utc>>,
}

impl TitleRecord {
    pub fn new(name: impl Into<String>, last_played: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            last_played: Some(last_played),
        }
    }

    /// A title listed without any play time
    pub fn unplayed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_played: None,
        }
    }
}

/// Signals fetched fresh from the identity provider for one vetting pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySignals {
    pub game_score: Option<i64>,
    pub reputation: Option<String>,
    /// Most recently played first
    pub titles: Vec<TitleRecord>,
}

/// Source of identity signals.
///
/// Implementations must return `titles` ordered most recent first: the spoof
/// scan stops at the first entry outside the lookback window.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SignalFetcher: Send + Sync {
    /// Fetch signals for a player. Profile settings (gamerscore, reputation)
    /// are only requested when `include_profile` is set.
    async fn fetch_signals(
        &self,
        player: &PlayerIdentity,
        include_profile: bool,
    ) -> AutomodResult<IdentitySignals>;
}
