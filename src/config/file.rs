//! Configuration file loading
//!
//! Handles loading configuration from TOML files.

use crate::config::Config;
use crate::error::ConfigError;

use std::path::{Path, PathBuf};

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "NVPROBE_CONFIG";

/// Configuration file handler
pub struct ConfigFile;

impl ConfigFile {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from `NVPROBE_CONFIG` or the default locations
    ///
    /// A file named by the environment must exist; default locations are
    /// skipped when missing.
    pub fn load_default() -> Result<Option<Config>, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(PathBuf::from(path)).map(Some);
        }

        for path in Self::default_paths() {
            if path.exists() {
                return Self::load(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// Default configuration file paths in search order; the first existing one wins
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("nvprobe.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("nvprobe").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/nvprobe/config.toml"));

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_paths_not_empty() {
        let paths = ConfigFile::default_paths();
        assert!(!paths.is_empty());
        assert!(paths.contains(&PathBuf::from("/etc/nvprobe/config.toml")));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigFile::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[general]\nverbose = true\n\n[processes]\nmax_count = 8\nsince_seconds = 2"
        )
        .unwrap();

        let config = ConfigFile::load(file.path()).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.processes.max_count, 8);
        assert_eq!(config.processes.since_seconds, 2);
        assert_eq!(config.sampling.window_seconds, 10);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sampling\nwindow_seconds = ").unwrap();

        assert!(matches!(ConfigFile::load(&path), Err(ConfigError::TomlError(_))));
    }
}
