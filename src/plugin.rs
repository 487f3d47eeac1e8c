//! Plugin runtime
//!
//! Owns the lifecycle hooks and the event loop that dispatches host events to
//! the vetter, the enforcer and the admin commands.

use crate::admin::WhitelistAdmin;
use crate::allowlist::AllowList;
use crate::config::Config;
use crate::enforcement::Enforcer;
use crate::error::AutomodResult;
use crate::host::PlayerRegistry;
use crate::vetting::{PlayerIdentity, Vetter};
use crate::{CONSOLE_TARGET, ERROR_TARGET, EVENT_TARGET};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Console lines waiting for the command task
const CONSOLE_QUEUE: usize = 32;

/// Events delivered by the game host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The host finished starting; connected players are in the registry
    Ready,
    /// A player finished joining
    PlayerInitialized(PlayerIdentity),
    /// A player left, by XUID
    PlayerLeft(String),
    /// An operator console line
    Console(String),
    /// Stop the event loop
    Shutdown,
}

/// The automod plugin
pub struct AutoMod {
    vetter: Vetter,
    enforcer: Enforcer,
    admin: WhitelistAdmin,
    players: Arc<dyn PlayerRegistry>,
}

impl AutoMod {
    /// Load hook: open the whitelist, creating it when missing
    ///
    /// # Errors
    ///
    /// Returns an error if the whitelist cannot be read or created.
    pub async fn on_loaded(config: &Config) -> AutomodResult<AllowList> {
        let allow_list = AllowList::open(config.whitelist_path()).await?;
        info!(
            target: CONSOLE_TARGET,
            entries = allow_list.all().len(),
            "Plugin loaded!"
        );
        Ok(allow_list)
    }

    pub fn new(
        vetter: Vetter,
        enforcer: Enforcer,
        admin: WhitelistAdmin,
        players: Arc<dyn PlayerRegistry>,
    ) -> Self {
        Self {
            vetter,
            enforcer,
            admin,
            players,
        }
    }

    /// Enable hook: vet everyone already connected. Returns how many checks
    /// were started.
    pub fn on_enabled(self: &Arc<Self>, tasks: &mut JoinSet<()>) -> usize {
        let players = self.players.connected_players();
        let count = players.len();
        for player in players {
            self.spawn_check(tasks, player);
        }
        info!(target: CONSOLE_TARGET, players = count, "Plugin enabled!");
        count
    }

    pub fn on_disabled(&self) {
        info!(target: CONSOLE_TARGET, "Plugin disabled!");
    }

    /// Vet a player and carry out the verdict
    pub async fn check_player(&self, player: &PlayerIdentity) {
        let verdict = self.vetter.vet(player).await;
        if let Err(e) = self.enforcer.apply(player, &verdict).await {
            error!(
                target: ERROR_TARGET,
                xuid = %player.xuid,
                name = %player.name,
                error_kind = e.kind(),
                error = %e,
                "Failed to kick player"
            );
        }
    }

    fn spawn_check(self: &Arc<Self>, tasks: &mut JoinSet<()>, player: PlayerIdentity) {
        let plugin = Arc::clone(self);
        tasks.spawn(async move {
            plugin.check_player(&player).await;
        });
    }

    /// Run the event loop until `Shutdown` or the channel closes.
    ///
    /// Vetting passes run concurrently. Console commands run in order on their
    /// own task so a slow gamertag lookup never holds up joins. In-flight
    /// passes and queued console commands finish before the disable hook runs.
    pub async fn run(self: Arc<Self>, mut rx: Receiver<HostEvent>) {
        let mut tasks = JoinSet::new();
        let (console_tx, mut console_rx) = mpsc::channel::<String>(CONSOLE_QUEUE);
        let admin = self.admin.clone();
        let console = tokio::spawn(async move {
            while let Some(line) = console_rx.recv().await {
                admin.handle_console_line(&line).await;
            }
        });

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(HostEvent::Ready) => {
                            self.on_enabled(&mut tasks);
                        }
                        Some(HostEvent::PlayerInitialized(player)) => {
                            debug!(target: EVENT_TARGET, xuid = %player.xuid, name = %player.name, "Player joined");
                            self.spawn_check(&mut tasks, player);
                        }
                        Some(HostEvent::PlayerLeft(xuid)) => {
                            debug!(target: EVENT_TARGET, xuid = %xuid, "Player left");
                        }
                        Some(HostEvent::Console(line)) => {
                            if console_tx.send(line).await.is_err() {
                                error!(target: ERROR_TARGET, "Console command task is gone");
                            }
                        }
                        Some(HostEvent::Shutdown) => {
                            info!(target: EVENT_TARGET, "Received shutdown request");
                            break;
                        }
                        None => break,
                    }
                },
                Some(result) = tasks.join_next() => {
                    if let Err(e) = result {
                        error!(target: ERROR_TARGET, error = %e, "Vetting task failed");
                    }
                },
            }
        }

        drop(console_tx);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(target: ERROR_TARGET, error = %e, "Vetting task failed");
            }
        }
        if let Err(e) = console.await {
            error!(target: ERROR_TARGET, error = %e, "Console command task failed");
        }

        self.on_disabled();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{GamertagResolver, MockGamertagResolver};
    use crate::enforcement::MockHostCommandSink;
    use crate::vetting::{IdentitySignals, MockSignalFetcher, TitleRecord};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct FixedPlayers(Vec<PlayerIdentity>);

    impl PlayerRegistry for FixedPlayers {
        fn connected_players(&self) -> Vec<PlayerIdentity> {
            self.0.clone()
        }
    }

    fn config(dir: &TempDir) -> Config {
        Config {
            banned_devices: vec!["Windows".to_string()],
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    /// Public history with nothing played inside the spoof window
    fn clean_fetcher() -> MockSignalFetcher {
        let mut fetcher = MockSignalFetcher::new();
        fetcher.expect_fetch_signals().returning(|_, _| {
            Ok(IdentitySignals {
                titles: vec![TitleRecord::new(
                    "Minecraft for Android",
                    Utc::now() - Duration::days(1),
                )],
                ..Default::default()
            })
        });
        fetcher
    }

    async fn plugin(
        dir: &TempDir,
        host: MockHostCommandSink,
        resolver: MockGamertagResolver,
        players: Vec<PlayerIdentity>,
    ) -> Arc<AutoMod> {
        let config = config(dir);
        let allow_list = AutoMod::on_loaded(&config).await.expect("load");
        let vetter = Vetter::new(
            Arc::new(config),
            Arc::new(clean_fetcher()),
            allow_list.clone(),
        );
        let enforcer = Enforcer::new(Arc::new(host));
        let admin = WhitelistAdmin::new(Arc::new(resolver), allow_list);
        Arc::new(AutoMod::new(
            vetter,
            enforcer,
            admin,
            Arc::new(FixedPlayers(players)),
        ))
    }

    #[tokio::test]
    async fn test_on_loaded_creates_whitelist() {
        let dir = TempDir::new().expect("tempdir");
        let allow_list = AutoMod::on_loaded(&config(&dir)).await.expect("load");
        assert!(allow_list.all().is_empty());
        assert!(dir.path().join("whitelist.json").exists());
    }

    #[tokio::test]
    async fn test_join_with_banned_device_is_kicked() {
        let dir = TempDir::new().expect("tempdir");
        let mut host = MockHostCommandSink::new();
        host.expect_execute_command()
            .withf(|command| command.starts_with(r#"kick "100" "#))
            .times(1)
            .returning(|_| Ok(()));
        let plugin = plugin(&dir, host, MockGamertagResolver::new(), Vec::new()).await;

        let (tx, rx) = mpsc::channel(8);
        tx.send(HostEvent::PlayerInitialized(PlayerIdentity::new("100", "Steve", "Windows")))
            .await
            .expect("send");
        tx.send(HostEvent::PlayerInitialized(PlayerIdentity::new("200", "Alex", "Android")))
            .await
            .expect("send");
        tx.send(HostEvent::Shutdown).await.expect("send");

        plugin.run(rx).await;
    }

    #[tokio::test]
    async fn test_ready_vets_connected_players() {
        let dir = TempDir::new().expect("tempdir");
        let mut host = MockHostCommandSink::new();
        host.expect_execute_command().times(2).returning(|_| Ok(()));
        let players = vec![
            PlayerIdentity::new("1", "A", "Windows"),
            PlayerIdentity::new("2", "B", "Windows"),
            PlayerIdentity::new("3", "C", "Android"),
        ];
        let plugin = plugin(&dir, host, MockGamertagResolver::new(), players).await;

        let (tx, rx) = mpsc::channel(8);
        tx.send(HostEvent::Ready).await.expect("send");
        drop(tx);

        plugin.run(rx).await;
    }

    #[tokio::test]
    async fn test_console_whitelist_lands_before_shutdown_completes() {
        let dir = TempDir::new().expect("tempdir");
        let mut resolver = MockGamertagResolver::new();
        resolver
            .expect_resolve_gamertag()
            .returning(|gamertag| Ok(if gamertag == "Steve" { "100" } else { "200" }.to_string()));
        let plugin = plugin(&dir, MockHostCommandSink::new(), resolver, Vec::new()).await;
        let allow_list = plugin.admin.allow_list().clone();

        let (tx, rx) = mpsc::channel(8);
        for line in ["whitelist Steve", "w Alex", "uw Alex"] {
            tx.send(HostEvent::Console(line.to_string()))
                .await
                .expect("send");
        }
        tx.send(HostEvent::Shutdown).await.expect("send");

        plugin.run(rx).await;
        assert_eq!(allow_list.all(), vec!["100".to_string()]);
    }

    #[tokio::test]
    async fn test_whitelisted_banned_device_is_not_kicked() {
        let dir = TempDir::new().expect("tempdir");
        let mut host = MockHostCommandSink::new();
        host.expect_execute_command().times(0);
        let plugin = plugin(&dir, host, MockGamertagResolver::new(), Vec::new()).await;
        plugin.admin.allow_list().add("100").await.expect("add");

        let (tx, rx) = mpsc::channel(8);
        tx.send(HostEvent::PlayerInitialized(PlayerIdentity::new("100", "Steve", "Windows")))
            .await
            .expect("send");
        tx.send(HostEvent::PlayerLeft("100".to_string()))
            .await
            .expect("send");
        tx.send(HostEvent::Shutdown).await.expect("send");

        plugin.run(rx).await;
    }

    struct GatedResolver(Arc<Notify>);

    #[async_trait::async_trait]
    impl GamertagResolver for GatedResolver {
        async fn resolve_gamertag(&self, _gamertag: &str) -> AutomodResult<String> {
            self.0.notified().await;
            Ok("300".to_string())
        }
    }

    #[tokio::test]
    async fn test_slow_console_command_does_not_block_joins() {
        let dir = TempDir::new().expect("tempdir");
        let gate = Arc::new(Notify::new());
        let mut host = MockHostCommandSink::new();
        let release = Arc::clone(&gate);
        host.expect_execute_command()
            .withf(|command| command.starts_with(r#"kick "100" "#))
            .times(1)
            .returning(move |_| {
                release.notify_one();
                Ok(())
            });

        let config = config(&dir);
        let allow_list = AutoMod::on_loaded(&config).await.expect("load");
        let vetter = Vetter::new(
            Arc::new(config),
            Arc::new(clean_fetcher()),
            allow_list.clone(),
        );
        let admin = WhitelistAdmin::new(Arc::new(GatedResolver(gate)), allow_list.clone());
        let plugin = Arc::new(AutoMod::new(
            vetter,
            Enforcer::new(Arc::new(host)),
            admin,
            Arc::new(FixedPlayers(Vec::new())),
        ));

        // The lookup only completes once the join has been kicked
        let (tx, rx) = mpsc::channel(8);
        tx.send(HostEvent::Console("whitelist Slowpoke".to_string()))
            .await
            .expect("send");
        tx.send(HostEvent::PlayerInitialized(PlayerIdentity::new("100", "Steve", "Windows")))
            .await
            .expect("send");
        tx.send(HostEvent::Shutdown).await.expect("send");

        tokio::time::timeout(std::time::Duration::from_secs(5), plugin.run(rx))
            .await
            .expect("join was held up by the console command");
        assert!(allow_list.contains("300"));
    }

    #[tokio::test]
    async fn test_kick_failure_does_not_stop_loop() {
        let dir = TempDir::new().expect("tempdir");
        let mut host = MockHostCommandSink::new();
        host.expect_execute_command()
            .times(2)
            .returning(|_| Err(crate::error::AutomodError::Host("closed".to_string())));
        let plugin = plugin(&dir, host, MockGamertagResolver::new(), Vec::new()).await;

        let (tx, rx) = mpsc::channel(8);
        for xuid in ["1", "2"] {
            tx.send(HostEvent::PlayerInitialized(PlayerIdentity::new(xuid, "P", "Windows")))
                .await
                .expect("send");
        }
        tx.send(HostEvent::Shutdown).await.expect("send");

        plugin.run(rx).await;
    }
}
