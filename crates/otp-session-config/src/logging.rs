//! Logging initialization.
//!
//! Every component logs through `tracing` macros. This module installs the
//! subscriber once at startup: structured JSONL appended to
//! `~/.otp-session/logs/otp-session.jsonl` plus a compact stderr stream.

use crate::{CoreError, CoreResult, Paths};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system.
///
/// The filter comes from `RUST_LOG` when set, otherwise from `level`.
/// When `paths` is given, JSON lines are appended to the log file; stderr
/// output is always enabled.
///
/// # Example
///
/// ```ignore
/// init_logging("info", Some(&paths))?;
/// tracing::info!("Session subsystem started");
/// ```
pub fn init_logging(level: &str, paths: Option<&Paths>) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).as_str().to_lowercase()));

    let json_layer = match paths {
        Some(paths) => {
            paths.ensure_dirs()?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(paths.log_file())?;
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let stderr_layer = fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| CoreError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
