//! Utilization domain types
//!
//! Types for GPU/memory utilization rates and video codec utilization.

use serde::{Deserialize, Serialize};

/// GPU and memory utilization over the driver's last sample period
///
/// Values are percentages in `[0, 100]` as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UtilizationRates {
    /// Percent of time one or more kernels were executing
    pub gpu: u32,
    /// Percent of time device memory was being read or written
    pub memory: u32,
}

impl UtilizationRates {
    /// Create a new utilization value
    pub fn new(gpu: u32, memory: u32) -> Self {
        Self { gpu, memory }
    }
}

/// Video encoder or decoder utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecUtilization {
    /// Utilization percentage
    pub utilization: u32,
    /// Sampling period in microseconds (variable, chosen by the driver)
    pub sampling_period_us: u32,
}

impl CodecUtilization {
    /// Create new codec utilization
    pub fn new(utilization: u32, sampling_period_us: u32) -> Self {
        Self {
            utilization,
            sampling_period_us,
        }
    }

    /// Sampling period in milliseconds
    pub fn sampling_period_ms(&self) -> u32 {
        self.sampling_period_us / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_sampling_period_ms() {
        let util = CodecUtilization::new(12, 167_000);
        assert_eq!(util.utilization, 12);
        assert_eq!(util.sampling_period_ms(), 167);
    }
}
