//! Raw NVML entry point signatures and native constants
//!
//! Native data layouts come from `nvml-wrapper-sys`, which mirrors `nvml.h`.
//! Nothing here links against the vendor library; every function type below
//! is resolved at runtime by the symbol table.

use std::ffi::{c_char, c_uint, c_ulonglong};

use nvml_wrapper_sys::bindings as sys;

pub use nvml_wrapper_sys::bindings::{
    nvmlAccountingStats_t, nvmlDevice_t, nvmlEnableState_t, nvmlMemory_t,
    nvmlProcessUtilizationSample_t, nvmlReturn_t, nvmlSample_t, nvmlSamplingType_t,
    nvmlTemperatureSensors_t, nvmlUtilization_t, nvmlValueType_t, nvmlValue_t,
};

/// Canonical file name of the management library, found via the loader search path
#[cfg(target_os = "windows")]
pub const LIBRARY_NAME: &str = "nvml.dll";

/// Canonical file name of the management library, found via the loader search path
#[cfg(not(target_os = "windows"))]
pub const LIBRARY_NAME: &str = "libnvidia-ml.so.1";

// Status codes used by the binding layer
pub const NVML_SUCCESS: nvmlReturn_t = sys::nvmlReturn_enum_NVML_SUCCESS;
pub const NVML_ERROR_INVALID_ARGUMENT: nvmlReturn_t = sys::nvmlReturn_enum_NVML_ERROR_INVALID_ARGUMENT;
pub const NVML_ERROR_NOT_SUPPORTED: nvmlReturn_t = sys::nvmlReturn_enum_NVML_ERROR_NOT_SUPPORTED;
pub const NVML_ERROR_NOT_FOUND: nvmlReturn_t = sys::nvmlReturn_enum_NVML_ERROR_NOT_FOUND;
pub const NVML_ERROR_INSUFFICIENT_SIZE: nvmlReturn_t =
    sys::nvmlReturn_enum_NVML_ERROR_INSUFFICIENT_SIZE;
pub const NVML_ERROR_DRIVER_NOT_LOADED: nvmlReturn_t =
    sys::nvmlReturn_enum_NVML_ERROR_DRIVER_NOT_LOADED;
pub const NVML_ERROR_LIBRARY_NOT_FOUND: nvmlReturn_t =
    sys::nvmlReturn_enum_NVML_ERROR_LIBRARY_NOT_FOUND;
pub const NVML_ERROR_UNKNOWN: nvmlReturn_t = sys::nvmlReturn_enum_NVML_ERROR_UNKNOWN;

pub const NVML_TOTAL_POWER_SAMPLES: nvmlSamplingType_t =
    sys::nvmlSamplingType_enum_NVML_TOTAL_POWER_SAMPLES;
pub const NVML_GPU_UTILIZATION_SAMPLES: nvmlSamplingType_t =
    sys::nvmlSamplingType_enum_NVML_GPU_UTILIZATION_SAMPLES;

pub const NVML_TEMPERATURE_GPU: nvmlTemperatureSensors_t =
    sys::nvmlTemperatureSensors_enum_NVML_TEMPERATURE_GPU;

pub const NVML_FEATURE_ENABLED: nvmlEnableState_t = sys::nvmlEnableState_enum_NVML_FEATURE_ENABLED;
pub const NVML_FEATURE_DISABLED: nvmlEnableState_t =
    sys::nvmlEnableState_enum_NVML_FEATURE_DISABLED;

// Buffer sizes mandated by nvml.h
pub const DRIVER_VERSION_BUFFER_SIZE: usize = sys::NVML_SYSTEM_DRIVER_VERSION_BUFFER_SIZE as usize;
pub const DEVICE_NAME_BUFFER_SIZE: usize = sys::NVML_DEVICE_NAME_BUFFER_SIZE as usize;
pub const DEVICE_UUID_BUFFER_SIZE: usize = sys::NVML_DEVICE_UUID_BUFFER_SIZE as usize;

// Function pointer types for the entry points resolved at load time
pub type FnInit = unsafe extern "C" fn() -> nvmlReturn_t;
pub type FnShutdown = unsafe extern "C" fn() -> nvmlReturn_t;
pub type FnErrorString = unsafe extern "C" fn(result: nvmlReturn_t) -> *const c_char;
pub type FnSystemGetDriverVersion =
    unsafe extern "C" fn(version: *mut c_char, length: c_uint) -> nvmlReturn_t;
pub type FnSystemGetProcessName =
    unsafe extern "C" fn(pid: c_uint, name: *mut c_char, length: c_uint) -> nvmlReturn_t;
pub type FnDeviceGetCount = unsafe extern "C" fn(count: *mut c_uint) -> nvmlReturn_t;
pub type FnDeviceGetHandleByIndex =
    unsafe extern "C" fn(index: c_uint, device: *mut nvmlDevice_t) -> nvmlReturn_t;
pub type FnDeviceGetUint = unsafe extern "C" fn(device: nvmlDevice_t, value: *mut c_uint) -> nvmlReturn_t;
pub type FnDeviceGetString =
    unsafe extern "C" fn(device: nvmlDevice_t, buf: *mut c_char, length: c_uint) -> nvmlReturn_t;
pub type FnDeviceGetMemoryInfo =
    unsafe extern "C" fn(device: nvmlDevice_t, memory: *mut nvmlMemory_t) -> nvmlReturn_t;
pub type FnDeviceGetUtilizationRates =
    unsafe extern "C" fn(device: nvmlDevice_t, utilization: *mut nvmlUtilization_t) -> nvmlReturn_t;
pub type FnDeviceGetTemperature = unsafe extern "C" fn(
    device: nvmlDevice_t,
    sensor: nvmlTemperatureSensors_t,
    temp: *mut c_uint,
) -> nvmlReturn_t;
pub type FnDeviceGetCodecUtilization = unsafe extern "C" fn(
    device: nvmlDevice_t,
    utilization: *mut c_uint,
    sampling_period_us: *mut c_uint,
) -> nvmlReturn_t;
pub type FnDeviceGetSamples = unsafe extern "C" fn(
    device: nvmlDevice_t,
    kind: nvmlSamplingType_t,
    last_seen_timestamp: c_ulonglong,
    value_type: *mut nvmlValueType_t,
    sample_count: *mut c_uint,
    samples: *mut nvmlSample_t,
) -> nvmlReturn_t;
pub type FnDeviceGetAccountingMode =
    unsafe extern "C" fn(device: nvmlDevice_t, mode: *mut nvmlEnableState_t) -> nvmlReturn_t;
pub type FnDeviceGetAccountingStats = unsafe extern "C" fn(
    device: nvmlDevice_t,
    pid: c_uint,
    stats: *mut nvmlAccountingStats_t,
) -> nvmlReturn_t;
pub type FnDeviceGetAccountingPids =
    unsafe extern "C" fn(device: nvmlDevice_t, count: *mut c_uint, pids: *mut c_uint) -> nvmlReturn_t;
pub type FnDeviceGetProcessUtilization = unsafe extern "C" fn(
    device: nvmlDevice_t,
    utilization: *mut nvmlProcessUtilizationSample_t,
    sample_count: *mut c_uint,
    last_seen_timestamp: c_ulonglong,
) -> nvmlReturn_t;

/// Convert a NUL-terminated C buffer into an owned string
///
/// Reads up to the first NUL, or the whole buffer if none is present.
pub fn c_buffer_to_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// A zero-initialized native output struct
///
/// Only used with plain-data `nvml.h` structs, for which all-zero bytes is a valid value.
pub(crate) fn zeroed<T: Copy>() -> T {
    // SAFETY: callers only instantiate this with C plain-old-data structs and
    // unions (integers, floats, fixed arrays), where the all-zero pattern is valid.
    unsafe { std::mem::zeroed() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_buffer_stops_at_nul() {
        let mut buf = [0 as c_char; DRIVER_VERSION_BUFFER_SIZE];
        for (dst, src) in buf.iter_mut().zip(b"460.32.03") {
            *dst = *src as c_char;
        }
        assert_eq!(c_buffer_to_string(&buf), "460.32.03");
    }

    #[test]
    fn test_c_buffer_without_nul_uses_whole_buffer() {
        let buf = [b'a' as c_char, b'b' as c_char, b'c' as c_char];
        assert_eq!(c_buffer_to_string(&buf), "abc");
    }

    #[test]
    fn test_empty_c_buffer() {
        assert_eq!(c_buffer_to_string(&[]), "");
    }

    #[test]
    fn test_buffer_sizes_match_header() {
        assert_eq!(DRIVER_VERSION_BUFFER_SIZE, 80);
        assert_eq!(DEVICE_NAME_BUFFER_SIZE, 64);
        assert_eq!(DEVICE_UUID_BUFFER_SIZE, 80);
    }
}
