//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::config::{Config, ConfigFile};
use crate::error::ConfigError;

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from `path`, or from the default locations
    pub fn with_file(mut self, path: Option<&str>) -> Result<Self, ConfigError> {
        let file_config = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::load_default()?,
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        Ok(self)
    }

    /// Override with CLI verbose flag
    pub fn with_verbose(mut self, verbose: Option<bool>) -> Self {
        if let Some(v) = verbose {
            self.config.general.verbose = v;
        }
        self
    }

    /// Override with CLI GPU index
    pub fn with_gpu(mut self, index: Option<u32>) -> Self {
        if let Some(i) = index {
            self.config.general.gpu = Some(i);
        }
        self
    }

    /// Override with CLI sampling window
    pub fn with_window(mut self, seconds: Option<u64>) -> Self {
        if let Some(s) = seconds {
            self.config.sampling.window_seconds = s;
        }
        self
    }

    /// Override with CLI process count
    pub fn with_max_processes(mut self, count: Option<u32>) -> Self {
        if let Some(c) = count {
            self.config.processes.max_count = c;
        }
        self
    }

    /// Override with CLI process recency window
    pub fn with_since(mut self, seconds: Option<u64>) -> Self {
        if let Some(s) = seconds {
            self.config.processes.since_seconds = s;
        }
        self
    }

    /// Validate and build the final configuration
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert!(!config.general.verbose);
        assert_eq!(config.general.gpu, None);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_verbose(Some(true))
            .with_gpu(Some(1))
            .with_window(Some(30))
            .with_max_processes(Some(16))
            .with_since(Some(5))
            .build()
            .unwrap();

        assert!(config.general.verbose);
        assert_eq!(config.general.gpu, Some(1));
        assert_eq!(config.sampling.window_seconds, 30);
        assert_eq!(config.processes.max_count, 16);
        assert_eq!(config.processes.since_seconds, 5);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nvprobe.toml");
        std::fs::write(&path, "[sampling]\nwindow_seconds = 60\n").unwrap();

        let config = ConfigBuilder::new()
            .with_file(path.to_str())
            .unwrap()
            .with_window(Some(5))
            .build()
            .unwrap();
        assert_eq!(config.sampling.window_seconds, 5);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = ConfigBuilder::new().with_file(Some("/nonexistent/nvprobe.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = ConfigBuilder::new().with_max_processes(Some(0)).build();
        assert!(result.is_err());
    }
}
