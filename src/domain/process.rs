//! Process utilization domain types
//!
//! Types for tracking per-process GPU engine utilization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Utilization sample of one process on one GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessUtilizationSample {
    /// Process ID (always positive)
    pub pid: u32,
    /// CPU timestamp of the sample in microseconds
    pub timestamp_us: u64,
    /// SM (3D/compute) utilization
    pub sm_util: u32,
    /// Framebuffer memory utilization
    pub mem_util: u32,
    /// Encoder utilization
    pub enc_util: u32,
    /// Decoder utilization
    pub dec_util: u32,
}

impl fmt::Display for ProcessUtilizationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PID {}: sm {}%, mem {}%, enc {}%, dec {}%",
            self.pid, self.sm_util, self.mem_util, self.enc_util, self.dec_util
        )
    }
}

/// Sort samples by SM utilization, busiest first
pub fn sorted_by_sm(samples: &[ProcessUtilizationSample]) -> Vec<&ProcessUtilizationSample> {
    let mut sorted: Vec<&ProcessUtilizationSample> = samples.iter().collect();
    sorted.sort_by(|a, b| b.sm_util.cmp(&a.sm_util).then(a.pid.cmp(&b.pid)));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pid: u32, sm_util: u32) -> ProcessUtilizationSample {
        ProcessUtilizationSample {
            pid,
            timestamp_us: 0,
            sm_util,
            mem_util: 0,
            enc_util: 0,
            dec_util: 0,
        }
    }

    #[test]
    fn test_sorted_by_sm() {
        let samples = vec![sample(1, 10), sample(2, 80), sample(3, 10)];
        let pids: Vec<u32> = sorted_by_sm(&samples).iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![2, 1, 3]);
    }

    #[test]
    fn test_display() {
        let s = sample(42, 55);
        assert_eq!(s.to_string(), "PID 42: sm 55%, mem 0%, enc 0%, dec 0%");
    }
}
