pub mod admin;
pub mod allowlist;
pub mod commands;
pub mod config;
pub mod data;
pub mod enforcement;
pub mod error;
pub mod handlers;
pub mod host;
pub mod logging;
pub mod plugin;
pub mod vetting;
pub mod xbox;

pub const BOT_NAME: &str = "realm_automod";
pub const COMMAND_TARGET: &str = "realm_automod::command";
pub const ERROR_TARGET: &str = "realm_automod::error";
pub const VETTING_TARGET: &str = "realm_automod::vetting";
pub const EVENT_TARGET: &str = "realm_automod::handlers";
pub const CONSOLE_TARGET: &str = "realm_automod";

pub use data::{Data, DataInner};
pub use error::{AutomodError, AutomodResult};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
