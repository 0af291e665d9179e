//! Layered configuration for fleetkeeper
//!
//! Configuration is read from up to three TOML files, in increasing priority:
//! the system file, the per-user file and a `fleetkeeper.toml` in the working
//! directory. Later files override earlier ones key by key; anything left
//! unspecified keeps its default.

mod providers;
mod reconciler;

pub use providers::{Ec2Config, ProvidersConfig};
pub use reconciler::{
    LoggingConfig, MAX_PERIOD_SECS, MIN_PERIOD_SECS, ReconcilerConfig, RetryConfig,
    is_valid_period,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Complete fleetkeeper configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FleetConfig {
    pub reconciler: ReconcilerConfig,
    pub providers: ProvidersConfig,
}

/// Locations searched for configuration files
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub system: PathBuf,
    pub user: Option<PathBuf>,
    pub local: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            system: PathBuf::from("/etc/fleetkeeper/config.toml"),
            user: dirs::config_dir().map(|dir| dir.join("fleetkeeper").join("config.toml")),
            local: PathBuf::from("fleetkeeper.toml"),
        }
    }

    /// Config files that exist, lowest priority first
    pub fn existing_paths(&self) -> Vec<&PathBuf> {
        let mut paths = vec![&self.system];
        if let Some(user) = &self.user {
            paths.push(user);
        }
        paths.push(&self.local);
        paths.into_iter().filter(|p| p.is_file()).collect()
    }

    pub fn user_config_dir(&self) -> Option<&Path> {
        self.user.as_deref().and_then(Path::parent)
    }
}

impl FleetConfig {
    /// Load configuration from the standard locations
    pub fn load() -> Result<Self> {
        Self::load_with_paths(&ConfigPaths::new())
    }

    pub fn load_with_paths(paths: &ConfigPaths) -> Result<Self> {
        let files: Vec<PathBuf> = paths.existing_paths().into_iter().cloned().collect();
        Self::load_from_files(&files)
    }

    /// Merge the given files in order. Files that do not exist are skipped.
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in files {
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let table: toml::Table = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            merge_tables(&mut merged, table);
        }

        toml::Value::Table(merged)
            .try_into()
            .context("Invalid fleetkeeper configuration")
    }

    /// Check value ranges. Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let reconciler = &self.reconciler;

        if !VALID_LOG_LEVELS.contains(&reconciler.log_level.as_str()) {
            errors.push(format!(
                "reconciler.log_level must be one of {:?}, got '{}'",
                VALID_LOG_LEVELS, reconciler.log_level
            ));
        }
        for (name, secs) in [
            ("interval_secs", reconciler.interval_secs),
            ("pass_timeout_secs", reconciler.pass_timeout_secs),
            ("batch_timeout_secs", reconciler.batch_timeout_secs),
        ] {
            if !is_valid_period(secs) {
                errors.push(format!(
                    "reconciler.{} must be between {} and {} seconds, got {}",
                    name, MIN_PERIOD_SECS, MAX_PERIOD_SECS, secs
                ));
            }
        }
        if reconciler.max_concurrent_batches == 0 {
            errors.push("reconciler.max_concurrent_batches must be at least 1".to_string());
        }

        let retry = &reconciler.retry;
        if retry.max_attempts == 0 {
            errors.push("reconciler.retry.max_attempts must be at least 1".to_string());
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            errors.push(
                "reconciler.retry.initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            );
        }
        if retry.multiplier < 1.0 {
            errors.push("reconciler.retry.multiplier must be at least 1.0".to_string());
        }

        if self.providers.ec2.enabled && self.providers.ec2.aws_bin.trim().is_empty() {
            errors.push("providers.ec2.aws_bin must be set when ec2 is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Commented default configuration suitable for writing to a new file
    pub fn generate_default_config() -> String {
        let body = Self::default()
            .to_toml()
            .unwrap_or_else(|e| format!("# failed to render defaults: {}\n", e));
        format!(
            "# fleetkeeper configuration\n\
             # Files are read from /etc/fleetkeeper/config.toml, the user config directory\n\
             # and ./fleetkeeper.toml; later files override earlier ones.\n\n{}",
            body
        )
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
