//! Reconciler configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Shortest accepted pass deadline, batch timeout or interval, in seconds
pub const MIN_PERIOD_SECS: f64 = 0.001;

/// Longest accepted pass deadline, batch timeout or interval (one year), in seconds
pub const MAX_PERIOD_SECS: f64 = 31_536_000.0;

/// Configuration for reconciliation passes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Path to the SQLite database file
    pub database: Option<String>,

    /// Seconds between reconciliation passes
    pub interval_secs: f64,

    /// Deadline for a single pass. Batches still in flight are abandoned.
    pub pass_timeout_secs: f64,

    /// Deadline for one provider query. An expired query fails only its batch.
    pub batch_timeout_secs: f64,

    /// Number of provider batches queried at the same time
    pub max_concurrent_batches: usize,

    /// Retry policy for provider status queries
    pub retry: RetryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database: None,
            interval_secs: 60.0,
            pass_timeout_secs: 300.0,
            batch_timeout_secs: 120.0,
            max_concurrent_batches: 4,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn pass_timeout(&self) -> Duration {
        period(self.pass_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        period(self.batch_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        period(self.interval_secs)
    }
}

/// Whether `secs` is usable as a deadline or interval
pub fn is_valid_period(secs: f64) -> bool {
    secs.is_finite() && (MIN_PERIOD_SECS..=MAX_PERIOD_SECS).contains(&secs)
}

/// Convert seconds to a non-zero duration, clamping out-of-range and NaN values
fn period(secs: f64) -> Duration {
    let secs = secs.max(MIN_PERIOD_SECS).min(MAX_PERIOD_SECS);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_millis(1))
}

/// Bounded exponential backoff for provider calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    pub initial_backoff_ms: u64,

    pub max_backoff_ms: u64,

    /// Factor applied to the delay after each failed attempt
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Logging configuration for the reconciler
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for log files (enables daily rotated file logging)
    pub log_dir: Option<PathBuf>,

    /// Use JSON format for log files
    pub json_logs: bool,
}
