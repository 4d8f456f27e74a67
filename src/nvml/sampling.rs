//! Averaging over the driver's sample ring buffers
//!
//! The driver keeps a bounded history of recent samples per kind. Reading it
//! is a two-call idiom: probe with a null buffer for the number of samples
//! newer than a cutoff, then fetch into a buffer of that size. The buffer is
//! live between the two calls, so the probed count is only a sizing hint.

use std::ffi::c_uint;
use std::ptr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::NvmlError;
use crate::nvml::device::Device;
use crate::nvml::ffi::*;

/// Which ring buffer to average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Total board power draw, in milliwatts
    TotalPower,
    /// GPU utilization percentage
    GpuUtilization,
}

impl SampleKind {
    pub(crate) fn as_native(self) -> nvmlSamplingType_t {
        match self {
            Self::TotalPower => NVML_TOTAL_POWER_SAMPLES,
            Self::GpuUtilization => NVML_GPU_UTILIZATION_SAMPLES,
        }
    }
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TotalPower => write!(f, "power"),
            Self::GpuUtilization => write!(f, "gpu utilization"),
        }
    }
}

/// Microseconds since the epoch, `since` ago; saturates at the epoch
pub(crate) fn last_seen_timestamp(since: Duration) -> u64 {
    timestamp_before(SystemTime::now(), since)
}

fn timestamp_before(now: SystemTime, since: Duration) -> u64 {
    now.checked_sub(since)
        .unwrap_or(UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Truncating mean of the unsigned values in `samples`
///
/// Returns `None` for an empty slice.
pub fn average_samples(samples: &[nvmlSample_t]) -> Option<u32> {
    if samples.is_empty() {
        return None;
    }
    let sum: u64 = samples
        .iter()
        // SAFETY: both sample kinds read here are reported as unsigned ints.
        .map(|s| u64::from(unsafe { s.sampleValue.uiVal }))
        .sum();
    // The mean of u32 values always fits in a u32
    Some((sum / samples.len() as u64) as u32)
}

impl Device<'_> {
    /// Mean of the `kind` samples recorded within the last `since`
    ///
    /// Fails with `NoSamples` when the window is empty.
    pub fn average_usage(&self, kind: SampleKind, since: Duration) -> Result<u32, NvmlError> {
        self.with_library(|lib| {
            let f = lib.symbols.device_get_samples.get()?;
            let last_seen = last_seen_timestamp(since);
            let mut value_type: nvmlValueType_t = zeroed();

            let mut probed: c_uint = 0;
            // SAFETY: library held loaded; a null buffer asks for the count only.
            let code = unsafe {
                f(
                    self.raw(),
                    kind.as_native(),
                    last_seen,
                    &mut value_type,
                    &mut probed,
                    ptr::null_mut(),
                )
            };
            if code == NVML_ERROR_NOT_FOUND {
                return Err(NvmlError::NoSamples);
            }
            lib.check(code)?;
            if probed == 0 {
                return Err(NvmlError::NoSamples);
            }

            let mut samples: Vec<nvmlSample_t> = vec![zeroed(); probed as usize];
            let mut fetched: c_uint = probed;
            // SAFETY: library held loaded; `samples` holds `fetched` elements.
            let code = unsafe {
                f(
                    self.raw(),
                    kind.as_native(),
                    last_seen,
                    &mut value_type,
                    &mut fetched,
                    samples.as_mut_ptr(),
                )
            };
            if code == NVML_ERROR_NOT_FOUND {
                return Err(NvmlError::NoSamples);
            }
            lib.check(code)?;

            if fetched != probed {
                log::debug!(
                    "GPU {}: {} sample count moved from {} to {} between probe and fetch",
                    self.index(),
                    kind,
                    probed,
                    fetched
                );
            }
            samples.truncate(fetched.min(probed) as usize);
            average_samples(&samples).ok_or(NvmlError::NoSamples)
        })
    }

    /// Mean power draw in milliwatts over the last `since`
    pub fn average_power_usage(&self, since: Duration) -> Result<u32, NvmlError> {
        self.average_usage(SampleKind::TotalPower, since)
    }

    /// Mean GPU utilization percentage over the last `since`
    pub fn average_gpu_utilization(&self, since: Duration) -> Result<u32, NvmlError> {
        self.average_usage(SampleKind::GpuUtilization, since)
    }
}
