//! Configuration system
//!
//! Handles TOML config file parsing and CLI argument merging. The location of
//! the NVML library itself is not configurable; it is always found through the
//! dynamic loader's search path.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Ring buffer sampling settings
    pub sampling: SamplingConfig,
    /// Per-process query settings
    pub processes: ProcessesConfig,
}

impl Config {
    /// Check values the native calls would reject
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.window_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sampling.window_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.processes.max_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "processes.max_count".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.processes.name_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "processes.name_buffer_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Restrict queries to one GPU index
    pub gpu: Option<u32>,
}

/// Ring buffer sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Averaging window in seconds
    pub window_seconds: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { window_seconds: 10 }
    }
}

impl SamplingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Per-process query configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessesConfig {
    /// Maximum number of processes fetched per GPU
    pub max_count: u32,
    /// Only report samples newer than this many seconds
    pub since_seconds: u64,
    /// Buffer size for process name lookups, in bytes
    pub name_buffer_size: u32,
}

impl Default for ProcessesConfig {
    fn default() -> Self {
        Self {
            max_count: 64,
            since_seconds: 10,
            name_buffer_size: 256,
        }
    }
}

impl ProcessesConfig {
    pub fn since(&self) -> Duration {
        Duration::from_secs(self.since_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling.window_seconds, 10);
        assert_eq!(config.processes.max_count, 64);
        assert_eq!(config.processes.since(), Duration::from_secs(10));
        assert_eq!(config.processes.name_buffer_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("[sampling]\nwindow_seconds = 30\n").unwrap();
        assert_eq!(config.sampling.window(), Duration::from_secs(30));
        assert_eq!(config.processes, ProcessesConfig::default());
        assert!(!config.general.verbose);
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let mut config = Config::default();
        config.processes.max_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "processes.max_count"
        ));

        let mut config = Config::default();
        config.sampling.window_seconds = 0;
        assert!(config.validate().is_err());
    }
}
