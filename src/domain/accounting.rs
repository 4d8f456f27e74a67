//! Per-process accounting domain types
//!
//! Accounting data is only collected while accounting mode is enabled on the
//! device. The driver keeps it in a bounded circular buffer; its capacity is
//! reported by `Device::accounting_buffer_size`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Accounting mode of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountingMode {
    /// Accounting is enabled
    Enabled,
    /// Accounting is disabled
    Disabled,
}

impl AccountingMode {
    /// Whether per-process stats are being collected
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl fmt::Display for AccountingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "Enabled"),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Lifetime statistics of one process, as retained by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountingStats {
    /// Percent of the process lifetime during which kernels were executing
    pub gpu_utilization: u32,
    /// Percent of the process lifetime during which device memory was accessed
    pub memory_utilization: u32,
    /// Peak memory ever allocated by the process, in bytes
    pub max_memory_usage: u64,
    /// Time the compute context was active, in ms (0 while still running)
    pub time_ms: u64,
    /// Process start as a CPU timestamp in microseconds
    pub start_time_us: u64,
    /// Whether the process is still running
    pub is_running: bool,
    /// Reserved by the driver
    pub reserved: [u32; 5],
}

/// Result of an accounting pid query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountingPids {
    /// Pids fetched; empty for a count-only query
    pub pids: Vec<u32>,
    /// Number of pids available (count-only query) or returned (fetch)
    pub count: u32,
}
