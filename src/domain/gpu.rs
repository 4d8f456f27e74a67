//! GPU identification domain type
//!
//! Provides the GpuInfo struct for GPU identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// GPU identification, as reported by enumeration
///
/// The enumeration index is not stable across reboots or processes; use
/// `uuid` to identify a GPU persistently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuInfo {
    /// Enumeration index (0-based)
    pub index: u32,
    /// GPU name (e.g., "NVIDIA GeForce RTX 4090")
    pub name: String,
    /// Unique GPU UUID
    pub uuid: String,
    /// Device node minor number (`/dev/nvidia<minor>`)
    pub minor_number: Option<u32>,
}

impl GpuInfo {
    /// Create new GPU info
    pub fn new(index: u32, name: String, uuid: String) -> Self {
        Self {
            index,
            name,
            uuid,
            minor_number: None,
        }
    }

    /// Set the minor number
    pub fn with_minor_number(mut self, minor: u32) -> Self {
        self.minor_number = Some(minor);
        self
    }

    /// Device node path, if the minor number is known
    pub fn device_node(&self) -> Option<String> {
        self.minor_number.map(|m| format!("/dev/nvidia{}", m))
    }

    /// Get a short display name
    pub fn short_name(&self) -> &str {
        // Remove "NVIDIA " prefix if present
        self.name.strip_prefix("NVIDIA ").unwrap_or(&self.name)
    }
}

impl fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.name)
    }
}
