//! Logging setup for workflow runs.
//!
//! The workflow config carries a logger level; `RUST_LOG`, when set, takes
//! precedence over it.

use crate::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Builds the filter for the given level, honouring `RUST_LOG`.
#[must_use]
pub fn log_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()))
}

/// Installs a text subscriber at the given level.
///
/// Returns false if a global subscriber was already installed, in which case
/// nothing changes.
pub fn init_logging(level: LogLevel) -> bool {
    init_logging_with_format(level, LogFormat::Text)
}

/// Installs a subscriber at the given level and format.
pub fn init_logging_with_format(level: LogLevel, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(level))
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}
