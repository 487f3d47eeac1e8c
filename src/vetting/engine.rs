//! Vetting rules
//!
//! Pure decision logic: no I/O and no shared mutable state, so a single
//! engine can be used from any number of concurrent vetting passes.

use crate::config::Config;
use crate::error::AutomodResult;
use crate::vetting::{Denial, DenialContext, IdentitySignals, PlayerIdentity, ReasonCode, Verdict};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Account that is always denied unless explicitly whitelisted
pub const RESERVED_DENY_XUID: &str = "2535409325025103";

/// Prefix stripped from title names to obtain the platform label
pub const TITLE_PLATFORM_PREFIX: &str = "Minecraft for ";

/// Applies the vetting rules with a fixed configuration
#[derive(Debug, Clone)]
pub struct VettingEngine {
    config: Arc<Config>,
}

impl VettingEngine {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rules that need no provider signals: the whitelist and banned devices.
    ///
    /// Returns `None` when the player has to go through the signal checks.
    #[must_use]
    pub fn screen(&self, player: &PlayerIdentity, allow_list: &[String]) -> Option<Verdict> {
        if allow_list.iter().any(|xuid| *xuid == player.xuid) {
            return Some(Verdict::Admit);
        }

        if self.config.is_banned_device(&player.device) || player.xuid == RESERVED_DENY_XUID {
            return Some(self.deny(
                ReasonCode::BannedDevice,
                DenialContext {
                    device: Some(player.device.clone()),
                    ..Default::default()
                },
            ));
        }

        None
    }

    /// Full evaluation. First matching rule wins.
    #[must_use]
    pub fn evaluate(
        &self,
        player: &PlayerIdentity,
        signals: &AutomodResult<IdentitySignals>,
        allow_list: &[String],
        now: DateTime<Utc>,
    ) -> Verdict {
        if let Some(verdict) = self.screen(player, allow_list) {
            return verdict;
        }

        let Ok(signals) = signals else {
            return self.deny(ReasonCode::InternalError, DenialContext::default());
        };

        if self.config.profile_checks_enabled() {
            if let Some(verdict) = self.check_profile(signals) {
                return verdict;
            }
        }

        self.check_history(player, signals, now)
    }

    /// Score then reputation. Both values are required once either check is
    /// enabled; a missing one is treated like a failed fetch.
    fn check_profile(&self, signals: &IdentitySignals) -> Option<Verdict> {
        let (Some(score), Some(reputation)) = (signals.game_score, &signals.reputation) else {
            return Some(self.deny(ReasonCode::InternalError, DenialContext::default()));
        };

        if score < self.config.game_score_requirement {
            return Some(self.deny(
                ReasonCode::LowGameScore,
                DenialContext {
                    score: Some(score),
                    ..Default::default()
                },
            ));
        }

        // Exact match, not a threshold
        if *reputation != self.config.reputation_requirement {
            return Some(self.deny(
                ReasonCode::LowReputation,
                DenialContext {
                    reputation: Some(reputation.clone()),
                    ..Default::default()
                },
            ));
        }

        None
    }

    fn check_history(
        &self,
        player: &PlayerIdentity,
        signals: &IdentitySignals,
        now: DateTime<Utc>,
    ) -> Verdict {
        if signals.titles.is_empty() {
            return self.deny(ReasonCode::PrivateHistory, DenialContext::default());
        }

        // An unrepresentable window reaches back past every entry
        let cutoff = self
            .config
            .spoof_window()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        for title in &signals.titles {
            // History is most recent first, everything after this is older
            if title.last_played.is_some_and(|played| played <= cutoff) {
                return Verdict::Admit;
            }

            let platform = title
                .name
                .strip_prefix(TITLE_PLATFORM_PREFIX)
                .unwrap_or(&title.name);
            if self.config.is_banned_device(platform) {
                return self.deny(
                    ReasonCode::DeviceSpoofing,
                    DenialContext {
                        device: Some(player.device.clone()),
                        detected_platform: Some(platform.to_string()),
                        ..Default::default()
                    },
                );
            }
        }

        Verdict::Admit
    }

    fn deny(&self, reason: ReasonCode, context: DenialContext) -> Verdict {
        Verdict::Deny(Denial::new(reason, context, &self.config.kick_messages))
    }
}
