//! Automod configuration
//!
//! Loaded once at startup from a YAML file and passed by reference to every
//! component that needs it. Keys keep the PascalCase names operators already
//! use in their existing realm configs.

use crate::error::{AutomodError, AutomodResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default location of the config file
pub const DEFAULT_CONFIG_FILE: &str = "config/automod.yaml";
/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "AUTOMOD_CONFIG";
/// Whitelist file name inside the data directory
pub const WHITELIST_FILE: &str = "whitelist.json";
/// Token cache file name inside the auth directory
pub const TOKEN_FILE: &str = "xbl_token.json";
/// Longest accepted `DeviceSpoofFetchBackTime`, one year in minutes
pub const MAX_SPOOF_LOOKBACK_MINUTES: i64 = 525_600;

/// Kick message templates, one per denial reason.
///
/// `{device}`, `{score}` and `{reputation}` are replaced with the values that
/// triggered the denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KickMessages {
    pub banned_device: String,
    pub low_game_score: String,
    pub low_reputation: String,
    pub private_history: String,
    pub device_spoofing: String,
    pub internal_error: String,
}

impl Default for KickMessages {
    fn default() -> Self {
        Self {
            banned_device: "You are using a banned device ({device}).".to_string(),
            low_game_score: "Your gamerscore ({score}) is too low to join this realm.".to_string(),
            low_reputation:
                "Your Xbox reputation ({reputation}) does not meet this realm's requirement."
                    .to_string(),
            private_history:
                "Your Xbox title history is private. Make it public to join this realm."
                    .to_string(),
            device_spoofing: "Device spoofing detected.".to_string(),
            internal_error: "An error occurred while AutoMod attempted to process you."
                .to_string(),
        }
    }
}

/// Discord moderation-log settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DiscordConfig {
    pub enabled: bool,
    /// Channel for AutoMod logs; empty means `default_channel`
    pub channel: String,
    /// Bridge channel used when `channel` is unset
    pub default_channel: String,
}

impl DiscordConfig {
    /// The channel ID moderation logs should go to, if one is configured
    #[must_use]
    pub fn log_channel(&self) -> Option<u64> {
        let raw = if self.channel.trim().is_empty() {
            self.default_channel.trim()
        } else {
            self.channel.trim()
        };
        raw.parse::<u64>().ok().filter(|id| *id != 0)
    }
}

/// Complete automod configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Config {
    pub banned_devices: Vec<String>,
    pub kick_messages: KickMessages,
    pub use_game_score: bool,
    pub game_score_requirement: i64,
    pub use_reputation: bool,
    /// Compared as an exact string match against the profile's reputation
    #[serde(deserialize_with = "string_or_int")]
    pub reputation_requirement: String,
    /// Send the kick reason to the player as an Xbox message
    pub xbox_message: bool,
    pub discord: DiscordConfig,
    /// Lookback window in minutes for device-spoof detection
    pub device_spoof_fetch_back_time: i64,
    pub signal_fetch_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub auth_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            banned_devices: Vec::new(),
            kick_messages: KickMessages::default(),
            use_game_score: false,
            game_score_requirement: 0,
            use_reputation: false,
            reputation_requirement: "GoodPlayer".to_string(),
            xbox_message: false,
            discord: DiscordConfig::default(),
            device_spoof_fetch_back_time: 60,
            signal_fetch_timeout_secs: 10,
            data_dir: PathBuf::from("data"),
            auth_dir: PathBuf::from("auth"),
        }
    }
}

fn string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        Str(String),
        Int(i64),
    }

    Ok(match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Str(value) => value,
        StringOrInt::Int(value) => value.to_string(),
    })
}

impl Config {
    /// Resolve the config path from the environment, falling back to the default
    #[must_use]
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load the configuration from a YAML file.
    ///
    /// A missing file yields the defaults with a warning.
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Config` if the file cannot be read or parsed, or
    /// if the parsed values are invalid.
    pub async fn load(path: &Path) -> AutomodResult<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_yaml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            Err(e) => {
                return Err(AutomodError::Config(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        config.validate()?;
        info!(
            banned_devices = config.banned_devices.len(),
            use_game_score = config.use_game_score,
            use_reputation = config.use_reputation,
            discord = config.discord.enabled,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse a configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Config` if the YAML is malformed.
    pub fn from_yaml(content: &str) -> AutomodResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| AutomodError::Config(format!("Malformed config: {e}")))
    }

    /// Check value ranges and cross-field requirements
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Config` describing the first invalid option.
    pub fn validate(&self) -> AutomodResult<()> {
        if !(0..=MAX_SPOOF_LOOKBACK_MINUTES).contains(&self.device_spoof_fetch_back_time) {
            return Err(AutomodError::Config(format!(
                "DeviceSpoofFetchBackTime must be between 0 and {MAX_SPOOF_LOOKBACK_MINUTES} minutes"
            )));
        }
        if self.signal_fetch_timeout_secs == 0 {
            return Err(AutomodError::Config(
                "SignalFetchTimeoutSecs must be greater than zero".to_string(),
            ));
        }
        if self.discord.enabled && self.discord.log_channel().is_none() {
            return Err(AutomodError::Config(
                "Discord is enabled but neither Channel nor DefaultChannel is a valid channel ID"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the device is on the banned list
    #[must_use]
    pub fn is_banned_device(&self, device: &str) -> bool {
        self.banned_devices.iter().any(|banned| banned == device)
    }

    /// Whether the profile settings (gamerscore, reputation) must be fetched
    #[must_use]
    pub fn profile_checks_enabled(&self) -> bool {
        self.use_game_score || self.use_reputation
    }

    /// Lookback window for device-spoof detection
    #[must_use]
    ///
    /// `None` if the configured minutes do not fit in a duration.
    pub fn spoof_window(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_minutes(self.device_spoof_fetch_back_time)
    }

    /// Upper bound on a single signal fetch
    #[must_use]
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.signal_fetch_timeout_secs)
    }

    #[must_use]
    pub fn whitelist_path(&self) -> PathBuf {
        self.data_dir.join(WHITELIST_FILE)
    }

    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.auth_dir.join(TOKEN_FILE)
    }
}
