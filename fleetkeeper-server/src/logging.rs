//! Logging setup for fleetkeeper-server
//!
//! Console output is always enabled. With a log directory, records are also
//! written to a daily rotated file, optionally as JSON. Records emitted through
//! the `log` facade by the library are captured as well.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "fleetkeeper-server.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the life of the process.
pub fn init_logging(
    log_dir: Option<&Path>,
    log_level: &str,
    json_logs: bool,
) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if json_logs {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(fmt::layer().with_target(true).with_level(true))
        .with(env_filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
