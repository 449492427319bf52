//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber.
//!
//! ## Key Features
//! - JSON (default) or human-readable output
//! - `RUST_LOG` directives take precedence over the configured level
//! - Safe to call more than once: later calls leave the installed subscriber in place

use tracing::{info, warn, Level};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::core::config::{LogFormat, LoggingConfig};

/// Parse a configured level, falling back to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Filter from `RUST_LOG`, or the configured level when it is unset or invalid
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    let level = parse_level(&config.level);
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()))
}

/// Initialise the global subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter = env_filter(config);

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        info!(level = %config.level, format = ?config.format, "Logging initialized");
    } else {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }
    installed
}
