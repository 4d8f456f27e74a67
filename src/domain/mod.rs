//! Domain models for nvprobe
//!
//! Plain values marshaled out of NVML's native structs. Every query builds
//! fresh values; nothing here is cached.

pub mod accounting;
pub mod gpu;
pub mod memory;
pub mod process;
pub mod utilization;

pub use accounting::{AccountingMode, AccountingPids, AccountingStats};
pub use gpu::GpuInfo;
pub use memory::MemoryInfo;
pub use process::ProcessUtilizationSample;
pub use utilization::{CodecUtilization, UtilizationRates};
