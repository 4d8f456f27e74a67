//! Framebuffer memory domain type

use serde::{Deserialize, Serialize};
use std::fmt;

/// VRAM usage of a device
///
/// `used` never exceeds `total` when built with [`MemoryInfo::new`]. The
/// derived figures tolerate values built or deserialized without that check.
///
/// # Examples
///
/// ```
/// use nvprobe::domain::MemoryInfo;
///
/// let mem = MemoryInfo::new(16 * 1024 * 1024 * 1024, 4 * 1024 * 1024 * 1024);
/// assert_eq!(mem.usage_percent(), 25);
/// assert_eq!(mem.free(), 12 * 1024 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total memory in bytes
    pub total: u64,
    /// Used memory in bytes
    pub used: u64,
}

impl MemoryInfo {
    /// Create a new memory info value, clamping `used` to `total`
    pub fn new(total: u64, used: u64) -> Self {
        Self {
            total,
            used: used.min(total),
        }
    }

    /// Free memory in bytes
    pub fn free(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }

    /// Get total memory in MB
    pub fn total_mb(&self) -> u64 {
        self.total / (1024 * 1024)
    }

    /// Get used memory in MB
    pub fn used_mb(&self) -> u64 {
        self.used / (1024 * 1024)
    }

    /// Get usage ratio (0.0 - 1.0)
    pub fn usage_ratio(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.used as f32 / self.total as f32).min(1.0)
        }
    }

    /// Get usage percentage (0 - 100)
    pub fn usage_percent(&self) -> u8 {
        (self.usage_ratio() * 100.0) as u8
    }
}

impl fmt::Display for MemoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} MiB", self.used_mb(), self.total_mb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_clamped_to_total() {
        let mem = MemoryInfo::new(100, 250);
        assert_eq!(mem.used, 100);
        assert_eq!(mem.free(), 0);
    }

    #[test]
    fn test_free_with_inconsistent_fields() {
        let mem = MemoryInfo { total: 1, used: 5 };
        assert_eq!(mem.free(), 0);
        assert_eq!(mem.usage_percent(), 100);

        let parsed: MemoryInfo = serde_json::from_str(r#"{"total":10,"used":20}"#).unwrap();
        assert_eq!(parsed.free(), 0);
    }

    #[test]
    fn test_zero_total() {
        let mem = MemoryInfo::new(0, 0);
        assert_eq!(mem.usage_ratio(), 0.0);
        assert_eq!(mem.usage_percent(), 0);
    }

    #[test]
    fn test_display() {
        let mem = MemoryInfo::new(8 * 1024 * 1024 * 1024, 1024 * 1024 * 1024);
        assert_eq!(mem.to_string(), "1024 / 8192 MiB");
    }
}
