use crate::{COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, Error};
use poise::{Context, FrameworkError};
use dashmap::DashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Log file name; vetting verdicts, kicks and commands all land here
pub const AUTOMOD_LOG_FILE: &str = "automod";

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,serenity=error,h2=warn,hyper=warn";

/// Initialize the logging system with console and file outputs
///
/// The console layer writes to stderr: stdout belongs to the host protocol.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let log_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, AUTOMOD_LOG_FILE);

    // Human-readable operator console
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    // Structured JSON for later review
    let file_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(log_file);

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Start times of in-flight commands, keyed by invocation ID.
///
/// The pre and post hooks may run on different runtime workers, and several
/// commands can be in flight at once.
#[derive(Debug, Default)]
pub struct CommandTimings {
    started: DashMap<u64, Instant>,
}

impl CommandTimings {
    pub fn start(&self, invocation_id: u64) {
        self.started.insert(invocation_id, Instant::now());
    }

    /// Time since `start` for this invocation, forgetting it
    pub fn finish(&self, invocation_id: u64) -> Option<Duration> {
        self.started
            .remove(&invocation_id)
            .map(|(_, started)| started.elapsed())
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.started.len()
    }
}

static COMMAND_TIMINGS: LazyLock<CommandTimings> = LazyLock::new(CommandTimings::default);

fn guild_label(ctx: Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_, Data, Error>) {
    COMMAND_TIMINGS.start(ctx.id());

    let args = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        ctx.invocation_string()
    };

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        arguments = %args,
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_, Data, Error>) {
    let duration_ms = COMMAND_TIMINGS
        .finish(ctx.id())
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    let Some(ctx) = error.ctx() else {
        error!(target: ERROR_TARGET, error = %error, "Framework error");
        return;
    };

    // The post-command hook does not run for failed commands
    COMMAND_TIMINGS.finish(ctx.id());

    let (kind, message) = match error {
        FrameworkError::Command { error, .. } => ("command", error.to_string()),
        FrameworkError::CommandCheckFailed { error, .. } => (
            "check_failed",
            error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string),
        ),
        FrameworkError::MissingUserPermissions { .. } => {
            ("missing_permissions", "User is not an administrator".to_string())
        }
        other => ("framework", other.to_string()),
    };

    error!(
        target: ERROR_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        error_kind = kind,
        error = %message,
        "Command failed"
    );
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
