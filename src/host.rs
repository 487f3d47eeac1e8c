//! Line-oriented stdio host adapter
//!
//! The game host talks to the automod over stdin/stdout. Events arrive as JSON
//! lines tagged by `event`; anything else is an operator console command.
//! Host commands go out on stdout as `{"command":"..."}` lines.

use crate::enforcement::HostCommandSink;
use crate::error::{AutomodError, AutomodResult};
use crate::plugin::HostEvent;
use crate::vetting::PlayerIdentity;
use crate::{ERROR_TARGET, EVENT_TARGET};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info};

/// Players currently connected to the host
pub trait PlayerRegistry: Send + Sync {
    fn connected_players(&self) -> Vec<PlayerIdentity>;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WireEvent {
    Ready {
        #[serde(default)]
        players: Vec<PlayerIdentity>,
    },
    PlayerInitialized {
        xuid: String,
        name: String,
        device: String,
    },
    PlayerLeft {
        xuid: String,
    },
}

#[derive(Debug, Serialize)]
struct WireCommand<'a> {
    command: &'a str,
}

/// Host adapter speaking the stdio line protocol
pub struct StdioHost {
    players: DashMap<String, PlayerIdentity>,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl std::fmt::Debug for StdioHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioHost")
            .field("players", &self.players)
            .finish_non_exhaustive()
    }
}

impl Default for StdioHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioHost {
    /// Host writing commands to stdout
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }

    pub fn with_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            players: DashMap::new(),
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Translate one input line into an event, tracking joins and leaves.
    /// Blank lines yield `None`.
    pub fn parse_line(&self, line: &str) -> Option<HostEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.starts_with('{') {
            match serde_json::from_str::<WireEvent>(line) {
                Ok(event) => return Some(self.track(event)),
                Err(e) => debug!(target: EVENT_TARGET, error = %e, "Treating line as console command"),
            }
        }

        Some(HostEvent::Console(line.to_string()))
    }

    fn track(&self, event: WireEvent) -> HostEvent {
        match event {
            WireEvent::Ready { players } => {
                self.players.clear();
                for player in players {
                    self.players.insert(player.xuid.clone(), player);
                }
                HostEvent::Ready
            }
            WireEvent::PlayerInitialized { xuid, name, device } => {
                let player = PlayerIdentity::new(xuid, name, device);
                self.players.insert(player.xuid.clone(), player.clone());
                HostEvent::PlayerInitialized(player)
            }
            WireEvent::PlayerLeft { xuid } => {
                self.players.remove(&xuid);
                HostEvent::PlayerLeft(xuid)
            }
        }
    }

    /// Read events from `reader` until end of input, then send `Shutdown`.
    pub async fn read_events<R>(&self, reader: R, tx: Sender<HostEvent>)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = self.parse_line(&line) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    info!(target: EVENT_TARGET, "Host input closed");
                    break;
                }
                Err(e) => {
                    error!(target: ERROR_TARGET, error = %e, "Failed to read from host");
                    break;
                }
            }
        }
        let _ = tx.send(HostEvent::Shutdown).await;
    }
}

impl PlayerRegistry for StdioHost {
    fn connected_players(&self) -> Vec<PlayerIdentity> {
        self.players.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait::async_trait]
impl HostCommandSink for StdioHost {
    async fn execute_command(&self, command: &str) -> AutomodResult<()> {
        let mut line = serde_json::to_string(&WireCommand { command })
            .map_err(|e| AutomodError::Host(e.to_string()))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AutomodError::Host(format!("Failed to send command: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| AutomodError::Host(format!("Failed to send command: {e}")))?;
        Ok(())
    }
}
