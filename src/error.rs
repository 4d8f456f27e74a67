//! Unified error types for nvprobe
//!
//! This module defines all error types used throughout the crate.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from NVML operations
    #[error("NVML error: {0}")]
    Nvml(#[from] NvmlError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// GPU not found by index
    #[error("GPU not found: index {index} (devices present: {count})")]
    GpuNotFound { index: u32, count: u32 },

    /// No GPUs detected in the system
    #[error("No NVIDIA GPUs detected")]
    NoGpusFound,

    /// IO error (output, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the NVML binding layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NvmlError {
    /// The library is not loaded, or has already been unloaded
    #[error("could not load NVML library")]
    LibraryNotLoaded,

    /// The shared library could not be opened
    #[error("NVML library not found ({0}). Is the NVIDIA driver installed?")]
    LibraryNotFound(String),

    /// The library is present but a required entry point is missing
    #[error("NVML function not found: {0}")]
    FunctionNotFound(&'static str),

    /// A native call returned a non-success status
    #[error("nvml: {message}")]
    Native { code: u32, message: String },

    /// Caller-supplied argument outside of its contract
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The sampling window held no samples to average
    #[error("No samples available in the requested window")]
    NoSamples,

    /// Failure outside of NVML's own status codes (e.g. unloading the library)
    #[error("NVML error: {0}")]
    Unknown(String),
}

impl NvmlError {
    /// Native status code carried by this error, if any
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_not_loaded_display() {
        let err = NvmlError::LibraryNotLoaded;
        assert_eq!(err.to_string(), "could not load NVML library");
    }

    #[test]
    fn test_library_not_found_display() {
        let err = NvmlError::LibraryNotFound("libnvidia-ml.so.1".to_string());
        assert!(err.to_string().contains("NVIDIA driver"));
        assert!(err.to_string().contains("libnvidia-ml.so.1"));
    }

    #[test]
    fn test_native_error_display_and_code() {
        let err = NvmlError::Native {
            code: 3,
            message: "Not Supported".to_string(),
        };
        assert_eq!(err.to_string(), "nvml: Not Supported");
        assert_eq!(err.code(), Some(3));
        assert_eq!(NvmlError::NoSamples.code(), None);
    }

    #[test]
    fn test_error_conversion() {
        let app_err: AppError = NvmlError::FunctionNotFound("nvmlDeviceGetSamples").into();
        assert!(matches!(
            app_err,
            AppError::Nvml(NvmlError::FunctionNotFound("nvmlDeviceGetSamples"))
        ));
    }

    #[test]
    fn test_gpu_not_found_display() {
        let err = AppError::GpuNotFound { index: 4, count: 2 };
        assert!(err.to_string().contains("index 4"));
        assert!(err.to_string().contains("devices present: 2"));
    }
}
