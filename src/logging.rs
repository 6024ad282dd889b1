//! Logging setup
//!
//! Installs a `tracing` subscriber writing to stderr, so prices printed on
//! stdout stay machine-readable. `RUST_LOG` takes precedence over the level
//! passed on the command line.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Parses a log level name, falling back to `WARN` for unknown names
pub fn parse_log_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::WARN)
}

/// Builds the filter used by the subscriber
fn env_filter(default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}

/// Initializes the global subscriber
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(parse_log_level(level)))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
