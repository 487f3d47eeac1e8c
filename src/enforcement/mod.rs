//! Enforcement of vetting verdicts
//!
//! This module kicks denied players and fans the kick out to the optional
//! direct-message and moderation-log channels.

mod actuator;
mod modlog;

pub use actuator::{DirectMessenger, Enforcer, HostCommandSink, kick_command};
#[cfg(test)]
pub use actuator::{MockDirectMessenger, MockHostCommandSink};
pub use modlog::{DiscordModLog, MOD_LOG_TITLE, ModLogEntry, ModerationLogSink};
#[cfg(test)]
pub use modlog::MockModerationLogSink;
