//! Vetting pass orchestration
//!
//! Runs the signal-free rules first so whitelisted players and banned devices
//! never cost a provider round-trip, then fetches signals under a timeout and
//! hands everything to the engine.

use crate::allowlist::AllowList;
use crate::config::Config;
use crate::error::AutomodError;
use crate::vetting::{PlayerIdentity, SignalFetcher, Verdict, VettingEngine};
use crate::VETTING_TARGET;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Vets players against the whitelist and fresh identity signals
#[derive(Clone)]
pub struct Vetter {
    engine: VettingEngine,
    fetcher: Arc<dyn SignalFetcher>,
    allow_list: AllowList,
    fetch_timeout: Duration,
}

impl Vetter {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn SignalFetcher>, allow_list: AllowList) -> Self {
        let fetch_timeout = config.fetch_timeout();
        Self {
            engine: VettingEngine::new(config),
            fetcher,
            allow_list,
            fetch_timeout,
        }
    }

    /// Decide whether a player may stay. Never fails: any fetch problem
    /// becomes an `InternalError` denial.
    pub async fn vet(&self, player: &PlayerIdentity) -> Verdict {
        let pass_id = Uuid::new_v4();
        let allow_list = self.allow_list.snapshot();

        if let Some(verdict) = self.engine.screen(player, &allow_list) {
            log_verdict(&pass_id, player, &verdict);
            return verdict;
        }

        let include_profile = self.engine.config().profile_checks_enabled();
        let signals = match tokio::time::timeout(
            self.fetch_timeout,
            self.fetcher.fetch_signals(player, include_profile),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AutomodError::Network(format!(
                "Signal fetch timed out after {}s",
                self.fetch_timeout.as_secs()
            ))),
        };

        if let Err(e) = &signals {
            warn!(
                target: VETTING_TARGET,
                pass_id = %pass_id,
                xuid = %player.xuid,
                error_kind = e.kind(),
                error = %e,
                "Failed to fetch identity signals"
            );
        }

        let verdict = self.engine.evaluate(player, &signals, &allow_list, Utc::now());
        log_verdict(&pass_id, player, &verdict);
        verdict
    }
}

fn log_verdict(pass_id: &Uuid, player: &PlayerIdentity, verdict: &Verdict) {
    match verdict {
        Verdict::Admit => info!(
            target: VETTING_TARGET,
            pass_id = %pass_id,
            xuid = %player.xuid,
            name = %player.name,
            device = %player.device,
            event = "admit",
            "Player admitted"
        ),
        Verdict::Deny(denial) => info!(
            target: VETTING_TARGET,
            pass_id = %pass_id,
            xuid = %player.xuid,
            name = %player.name,
            device = %player.device,
            reason = %denial.reason,
            event = "deny",
            "Player denied"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutomodResult;
    use crate::vetting::{IdentitySignals, MockSignalFetcher, ReasonCode, TitleRecord};
    use tempfile::TempDir;

    fn config() -> Arc<Config> {
        Arc::new(Config {
            banned_devices: vec!["Windows".to_string()],
            device_spoof_fetch_back_time: 60,
            signal_fetch_timeout_secs: 5,
            ..Default::default()
        })
    }

    async fn allow_list(dir: &TempDir) -> AllowList {
        AllowList::open(dir.path().join("whitelist.json"))
            .await
            .expect("open")
    }

    #[tokio::test]
    async fn test_whitelisted_player_skips_fetch() {
        let dir = TempDir::new().expect("tempdir");
        let list = allow_list(&dir).await;
        list.add("111").await.expect("add");

        let mut fetcher = MockSignalFetcher::new();
        fetcher.expect_fetch_signals().times(0);

        let vetter = Vetter::new(config(), Arc::new(fetcher), list);
        let player = PlayerIdentity::new("111", "Steve", "Windows");
        assert!(vetter.vet(&player).await.is_admit());
    }

    #[tokio::test]
    async fn test_banned_device_skips_fetch() {
        let dir = TempDir::new().expect("tempdir");
        let mut fetcher = MockSignalFetcher::new();
        fetcher.expect_fetch_signals().times(0);

        let vetter = Vetter::new(config(), Arc::new(fetcher), allow_list(&dir).await);
        let player = PlayerIdentity::new("111", "Steve", "Windows");
        assert_eq!(
            vetter.vet(&player).await.reason(),
            Some(ReasonCode::BannedDevice)
        );
    }

    #[tokio::test]
    async fn test_fetch_error_denies() {
        let dir = TempDir::new().expect("tempdir");
        let mut fetcher = MockSignalFetcher::new();
        fetcher
            .expect_fetch_signals()
            .times(1)
            .returning(|_, _| Err(AutomodError::Network("connection reset".to_string())));

        let vetter = Vetter::new(config(), Arc::new(fetcher), allow_list(&dir).await);
        let player = PlayerIdentity::new("111", "Steve", "Android");
        assert_eq!(
            vetter.vet(&player).await.reason(),
            Some(ReasonCode::InternalError)
        );
    }

    #[tokio::test]
    async fn test_profile_requested_only_when_checks_enabled() {
        let dir = TempDir::new().expect("tempdir");
        let mut fetcher = MockSignalFetcher::new();
        fetcher
            .expect_fetch_signals()
            .withf(|_, include_profile| !*include_profile)
            .times(1)
            .returning(|_, _| {
                Ok(IdentitySignals {
                    titles: vec![TitleRecord::new(
                        "Minecraft for Android",
                        Utc::now() - chrono::Duration::minutes(5),
                    )],
                    ..Default::default()
                })
            });

        let vetter = Vetter::new(config(), Arc::new(fetcher), allow_list(&dir).await);
        let player = PlayerIdentity::new("111", "Steve", "Android");
        assert!(vetter.vet(&player).await.is_admit());

        let mut fetcher = MockSignalFetcher::new();
        fetcher
            .expect_fetch_signals()
            .withf(|_, include_profile| *include_profile)
            .times(1)
            .returning(|_, _| {
                Ok(IdentitySignals {
                    game_score: Some(10),
                    reputation: Some("GoodPlayer".to_string()),
                    ..Default::default()
                })
            });
        let config = Arc::new(Config {
            use_game_score: true,
            game_score_requirement: 100,
            ..config().as_ref().clone()
        });
        let vetter = Vetter::new(config, Arc::new(fetcher), allow_list(&dir).await);
        assert_eq!(
            vetter.vet(&player).await.reason(),
            Some(ReasonCode::LowGameScore)
        );
    }

    #[tokio::test]
    async fn test_spoofing_scenario() {
        let dir = TempDir::new().expect("tempdir");
        let mut fetcher = MockSignalFetcher::new();
        fetcher.expect_fetch_signals().returning(|_, _| {
            Ok(IdentitySignals {
                titles: vec![TitleRecord::new(
                    "Minecraft for Windows",
                    Utc::now() - chrono::Duration::minutes(30),
                )],
                ..Default::default()
            })
        });

        let vetter = Vetter::new(config(), Arc::new(fetcher), allow_list(&dir).await);
        let player = PlayerIdentity::new("111", "Steve", "Android");
        assert_eq!(
            vetter.vet(&player).await.reason(),
            Some(ReasonCode::DeviceSpoofing)
        );
    }

    struct StalledFetcher;

    #[async_trait::async_trait]
    impl SignalFetcher for StalledFetcher {
        async fn fetch_signals(
            &self,
            _player: &PlayerIdentity,
            _include_profile: bool,
        ) -> AutomodResult<IdentitySignals> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(IdentitySignals::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_denies() {
        let dir = TempDir::new().expect("tempdir");
        let list = allow_list(&dir).await;
        let vetter = Vetter::new(config(), Arc::new(StalledFetcher), list);
        let player = PlayerIdentity::new("111", "Steve", "Android");
        assert_eq!(
            vetter.vet(&player).await.reason(),
            Some(ReasonCode::InternalError)
        );
    }
}
