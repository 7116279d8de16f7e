//! YAML configuration loader for the reconciler.
//!
//! All knobs have defaults matching the production schedule, so an empty
//! file (or no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV_VAR: &str = "ALR_CONFIG";

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Tunable settings for reconciliation and workflow processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Inventory page size for reconciliation passes.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Days an asset counts as NEW after insertion.
    #[serde(default = "default_new_asset_window_days")]
    pub new_asset_window_days: i64,
    /// Minimum days between missing-checks on one asset.
    #[serde(default = "default_missing_check_interval_days")]
    pub missing_check_interval_days: i64,
    /// Days an asset may stay unmatched before auto-decommission.
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: i64,
    /// Bounded retries for optimistic-version write conflicts.
    #[serde(default = "default_max_write_retries")]
    pub max_write_retries: u32,
}

fn default_batch_size() -> usize {
    500
}

fn default_new_asset_window_days() -> i64 {
    30
}

fn default_missing_check_interval_days() -> i64 {
    14
}

fn default_grace_period_days() -> i64 {
    14
}

fn default_max_write_retries() -> u32 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            new_asset_window_days: default_new_asset_window_days(),
            missing_check_interval_days: default_missing_check_interval_days(),
            grace_period_days: default_grace_period_days(),
            max_write_retries: default_max_write_retries(),
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from the path in `ALR_CONFIG`, or defaults when the
    /// variable is unset.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Rejects values that would stall or thrash the engines.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.grace_period_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "grace_period_days must be positive".to_string(),
            ));
        }
        if self.new_asset_window_days < 0 || self.missing_check_interval_days < 0 {
            return Err(ConfigError::InvalidValue(
                "day windows must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
