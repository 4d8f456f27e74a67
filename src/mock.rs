//! Stub NVML library for testing
//!
//! [`StubLibrary`] exports plain Rust functions under NVML's entry point
//! names, so the real loader, symbol table and device queries can be
//! exercised without a GPU. The fake driver state is thread-local: each test
//! installs its own [`StubDriver`] and inspects it afterwards.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, c_uint, c_ulonglong, c_void};

use crate::nvml::ffi::*;
use crate::nvml::{LibraryLoader, NativeLibrary};

thread_local! {
    static DRIVER: RefCell<StubDriver> = RefCell::new(StubDriver::default());
}

/// Fake driver state behind the stub entry points
#[derive(Debug, Clone)]
pub struct StubDriver {
    pub driver_version: String,
    pub devices: Vec<StubDevice>,
    pub process_names: HashMap<u32, String>,
    pub init_status: nvmlReturn_t,
    pub shutdown_status: nvmlReturn_t,
    pub missing_symbols: HashSet<String>,
    pub open_fails: bool,
    pub close_fails: bool,

    /// Calls made through any stub entry point
    pub native_calls: u32,
    pub init_calls: u32,
    pub shutdown_calls: u32,
    /// Libraries opened and not yet closed
    pub open_handles: u32,
    /// Cutoff passed to the last timestamped query
    pub last_seen_timestamp: u64,
}

impl Default for StubDriver {
    fn default() -> Self {
        Self {
            driver_version: "550.54.14".to_string(),
            devices: Vec::new(),
            process_names: HashMap::new(),
            init_status: NVML_SUCCESS,
            shutdown_status: NVML_SUCCESS,
            missing_symbols: HashSet::new(),
            open_fails: false,
            close_fails: false,
            native_calls: 0,
            init_calls: 0,
            shutdown_calls: 0,
            open_handles: 0,
            last_seen_timestamp: 0,
        }
    }
}

impl StubDriver {
    /// Builder: add a device; devices enumerate in insertion order
    pub fn with_device(mut self, device: StubDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Builder: do not export `name`
    pub fn without_symbol(mut self, name: impl Into<String>) -> Self {
        self.missing_symbols.insert(name.into());
        self
    }

    /// Builder: make opening the library fail
    pub fn with_open_failure(mut self) -> Self {
        self.open_fails = true;
        self
    }

    /// Builder: make unloading the library fail
    pub fn with_close_failure(mut self) -> Self {
        self.close_fails = true;
        self
    }

    /// Builder: status returned by `nvmlInit_v2`
    pub fn with_init_status(mut self, status: nvmlReturn_t) -> Self {
        self.init_status = status;
        self
    }

    /// Builder: status returned by `nvmlShutdown`
    pub fn with_shutdown_status(mut self, status: nvmlReturn_t) -> Self {
        self.shutdown_status = status;
        self
    }

    /// Builder: set driver version
    pub fn with_driver_version(mut self, version: impl Into<String>) -> Self {
        self.driver_version = version.into();
        self
    }

    /// Builder: name reported for `pid`
    pub fn with_process_name(mut self, pid: u32, name: impl Into<String>) -> Self {
        self.process_names.insert(pid, name.into());
        self
    }
}

/// One fake GPU
#[derive(Debug, Clone)]
pub struct StubDevice {
    pub index: u32,
    pub name: String,
    pub uuid: String,
    pub memory_total: u64,
    pub memory_used: u64,
    pub gpu_utilization: u32,
    pub memory_utilization: u32,
    pub power_usage: u32,
    pub temperature: u32,
    pub fan_speed: u32,
    pub fan_status: nvmlReturn_t,
    pub encoder_utilization: u32,
    pub decoder_utilization: u32,
    pub codec_period_us: u32,
    pub accounting_enabled: bool,
    pub accounting_buffer_size: u32,
    pub accounting_pids: Vec<u32>,
    pub process_samples: Vec<StubProcessSample>,
    pub power_samples: Vec<u32>,
    pub utilization_samples: Vec<u32>,
    /// Count reported by a sample fetch, if it should differ from the buffer
    pub fetch_reports: Option<u32>,
    /// Status of a sample query over an empty ring buffer
    pub empty_window_status: nvmlReturn_t,
}

impl StubDevice {
    /// Create a stub device with default values
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: format!("Stub GPU {}", index),
            uuid: format!("GPU-{:08}-stub", index),
            memory_total: 8 * 1024 * 1024 * 1024,
            memory_used: 1024 * 1024 * 1024,
            gpu_utilization: 35,
            memory_utilization: 12,
            power_usage: 70_000,
            temperature: 54,
            fan_speed: 40,
            fan_status: NVML_SUCCESS,
            encoder_utilization: 5,
            decoder_utilization: 9,
            codec_period_us: 167_000,
            accounting_enabled: false,
            accounting_buffer_size: 4000,
            accounting_pids: Vec::new(),
            process_samples: Vec::new(),
            power_samples: Vec::new(),
            utilization_samples: Vec::new(),
            fetch_reports: None,
            empty_window_status: NVML_ERROR_NOT_FOUND,
        }
    }

    /// Builder: set name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: set raw memory figures (not validated)
    pub fn with_memory(mut self, total: u64, used: u64) -> Self {
        self.memory_total = total;
        self.memory_used = used;
        self
    }

    /// Builder: status returned by the fan speed query
    pub fn with_fan_status(mut self, status: nvmlReturn_t) -> Self {
        self.fan_status = status;
        self
    }

    /// Builder: enable accounting with `pids` in the buffer
    pub fn with_accounting(mut self, pids: Vec<u32>) -> Self {
        self.accounting_enabled = true;
        self.accounting_pids = pids;
        self
    }

    /// Builder: per-process utilization slots, zero pids included
    pub fn with_process_samples(mut self, samples: Vec<StubProcessSample>) -> Self {
        self.process_samples = samples;
        self
    }

    /// Builder: power ring buffer contents, in milliwatts
    pub fn with_power_samples(mut self, samples: Vec<u32>) -> Self {
        self.power_samples = samples;
        self
    }

    /// Builder: utilization ring buffer contents
    pub fn with_utilization_samples(mut self, samples: Vec<u32>) -> Self {
        self.utilization_samples = samples;
        self
    }

    /// Builder: make sample fetches report `count` regardless of what was written
    pub fn with_fetch_reports(mut self, count: u32) -> Self {
        self.fetch_reports = Some(count);
        self
    }

    /// Builder: answer an empty sample window with success and a zero count
    pub fn with_empty_window_success(mut self) -> Self {
        self.empty_window_status = NVML_SUCCESS;
        self
    }
}

/// One per-process utilization slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubProcessSample {
    pub pid: u32,
    pub sm_util: u32,
    pub mem_util: u32,
    pub enc_util: u32,
    pub dec_util: u32,
}

impl StubProcessSample {
    pub fn new(pid: u32, sm_util: u32) -> Self {
        Self {
            pid,
            sm_util,
            mem_util: sm_util / 2,
            enc_util: 0,
            dec_util: 0,
        }
    }
}

/// Library handle that resolves to the stub entry points
#[derive(Debug)]
pub struct StubLibrary;

impl StubLibrary {
    /// Open the stub, failing if the installed driver says so
    pub fn open() -> Result<Self, String> {
        with_driver(|d| {
            if d.open_fails {
                return Err(format!("{}: cannot open shared object file", LIBRARY_NAME));
            }
            d.open_handles += 1;
            Ok(StubLibrary)
        })
    }
}

impl NativeLibrary for StubLibrary {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        if with_driver(|d| d.missing_symbols.contains(name)) {
            return None;
        }
        let addr = match name {
            "nvmlInit_v2" => stub_init as FnInit as *const c_void,
            "nvmlShutdown" => stub_shutdown as FnShutdown as *const c_void,
            "nvmlErrorString" => stub_error_string as FnErrorString as *const c_void,
            "nvmlSystemGetDriverVersion" => {
                stub_driver_version as FnSystemGetDriverVersion as *const c_void
            }
            "nvmlSystemGetProcessName" => stub_process_name as FnSystemGetProcessName as *const c_void,
            "nvmlDeviceGetCount_v2" => stub_device_count as FnDeviceGetCount as *const c_void,
            "nvmlDeviceGetHandleByIndex_v2" => {
                stub_handle_by_index as FnDeviceGetHandleByIndex as *const c_void
            }
            "nvmlDeviceGetMinorNumber" => stub_minor_number as FnDeviceGetUint as *const c_void,
            "nvmlDeviceGetUUID" => stub_uuid as FnDeviceGetString as *const c_void,
            "nvmlDeviceGetName" => stub_name as FnDeviceGetString as *const c_void,
            "nvmlDeviceGetMemoryInfo" => stub_memory_info as FnDeviceGetMemoryInfo as *const c_void,
            "nvmlDeviceGetUtilizationRates" => {
                stub_utilization_rates as FnDeviceGetUtilizationRates as *const c_void
            }
            "nvmlDeviceGetPowerUsage" => stub_power_usage as FnDeviceGetUint as *const c_void,
            "nvmlDeviceGetTemperature" => stub_temperature as FnDeviceGetTemperature as *const c_void,
            "nvmlDeviceGetFanSpeed" => stub_fan_speed as FnDeviceGetUint as *const c_void,
            "nvmlDeviceGetSamples" => stub_samples as FnDeviceGetSamples as *const c_void,
            "nvmlDeviceGetEncoderUtilization" => {
                stub_encoder_utilization as FnDeviceGetCodecUtilization as *const c_void
            }
            "nvmlDeviceGetDecoderUtilization" => {
                stub_decoder_utilization as FnDeviceGetCodecUtilization as *const c_void
            }
            "nvmlDeviceGetAccountingMode" => {
                stub_accounting_mode as FnDeviceGetAccountingMode as *const c_void
            }
            "nvmlDeviceGetAccountingStats" => {
                stub_accounting_stats as FnDeviceGetAccountingStats as *const c_void
            }
            "nvmlDeviceGetAccountingPids" => {
                stub_accounting_pids as FnDeviceGetAccountingPids as *const c_void
            }
            "nvmlDeviceGetAccountingBufferSize" => {
                stub_accounting_buffer_size as FnDeviceGetUint as *const c_void
            }
            "nvmlDeviceGetProcessUtilization" => {
                stub_process_utilization as FnDeviceGetProcessUtilization as *const c_void
            }
            _ => return None,
        };
        Some(addr)
    }

    fn close(self: Box<Self>) -> Result<(), String> {
        with_driver(|d| {
            if d.close_fails {
                return Err("stub close failure".to_string());
            }
            d.open_handles = d.open_handles.saturating_sub(1);
            Ok(())
        })
    }
}

/// Replace this thread's stub driver state
pub fn install(driver: StubDriver) {
    DRIVER.with(|d| *d.borrow_mut() = driver);
}

/// Inspect or modify this thread's stub driver state
pub fn with_driver<R>(f: impl FnOnce(&mut StubDriver) -> R) -> R {
    DRIVER.with(|d| f(&mut d.borrow_mut()))
}

/// A loader that opens [`StubLibrary`]
pub fn stub_loader() -> LibraryLoader {
    LibraryLoader::with_opener(|| StubLibrary::open().map(|lib| Box::new(lib) as Box<dyn NativeLibrary>))
}

/// Libraries currently open
pub fn open_handles() -> u32 {
    with_driver(|d| d.open_handles)
}

/// Calls made through stub entry points so far
pub fn native_calls() -> u32 {
    with_driver(|d| d.native_calls)
}

fn native<R>(f: impl FnOnce(&mut StubDriver) -> R) -> R {
    with_driver(|d| {
        d.native_calls += 1;
        f(d)
    })
}

fn device_call(device: nvmlDevice_t, f: impl FnOnce(&StubDevice) -> nvmlReturn_t) -> nvmlReturn_t {
    native(|d| {
        match (device as usize).checked_sub(1).and_then(|i| d.devices.get(i)) {
            Some(dev) => f(dev),
            None => NVML_ERROR_INVALID_ARGUMENT,
        }
    })
}

/// Copy `s` into a C buffer of `len` bytes, truncating and terminating
unsafe fn write_c_string(buf: *mut c_char, len: c_uint, s: &str) -> nvmlReturn_t {
    if buf.is_null() || len == 0 {
        return NVML_ERROR_INVALID_ARGUMENT;
    }
    let n = s.len().min(len as usize - 1);
    for (i, b) in s.bytes().take(n).enumerate() {
        *buf.add(i) = b as c_char;
    }
    *buf.add(n) = 0;
    NVML_SUCCESS
}

unsafe extern "C" fn stub_init() -> nvmlReturn_t {
    native(|d| {
        d.init_calls += 1;
        d.init_status
    })
}

unsafe extern "C" fn stub_shutdown() -> nvmlReturn_t {
    native(|d| {
        d.shutdown_calls += 1;
        d.shutdown_status
    })
}

unsafe extern "C" fn stub_error_string(result: nvmlReturn_t) -> *const c_char {
    native(|_| ());
    let message: &'static [u8] = match result {
        NVML_SUCCESS => b"Success\0",
        NVML_ERROR_INVALID_ARGUMENT => b"Invalid Argument\0",
        NVML_ERROR_NOT_SUPPORTED => b"Not Supported\0",
        NVML_ERROR_NOT_FOUND => b"Not Found\0",
        NVML_ERROR_INSUFFICIENT_SIZE => b"Insufficient Size\0",
        NVML_ERROR_DRIVER_NOT_LOADED => b"Driver Not Loaded\0",
        _ => b"Unknown Error\0",
    };
    message.as_ptr() as *const c_char
}

unsafe extern "C" fn stub_driver_version(version: *mut c_char, length: c_uint) -> nvmlReturn_t {
    let v = native(|d| d.driver_version.clone());
    write_c_string(version, length, &v)
}

unsafe extern "C" fn stub_process_name(pid: c_uint, name: *mut c_char, length: c_uint) -> nvmlReturn_t {
    match native(|d| d.process_names.get(&pid).cloned()) {
        Some(n) => write_c_string(name, length, &n),
        None => NVML_ERROR_NOT_FOUND,
    }
}

unsafe extern "C" fn stub_device_count(count: *mut c_uint) -> nvmlReturn_t {
    *count = native(|d| d.devices.len() as c_uint);
    NVML_SUCCESS
}

unsafe extern "C" fn stub_handle_by_index(index: c_uint, device: *mut nvmlDevice_t) -> nvmlReturn_t {
    let known = native(|d| (index as usize) < d.devices.len());
    if !known {
        return NVML_ERROR_INVALID_ARGUMENT;
    }
    *device = (index as usize + 1) as nvmlDevice_t;
    NVML_SUCCESS
}

unsafe extern "C" fn stub_minor_number(device: nvmlDevice_t, value: *mut c_uint) -> nvmlReturn_t {
    device_call(device, |dev| {
        *value = dev.index;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_uuid(device: nvmlDevice_t, buf: *mut c_char, length: c_uint) -> nvmlReturn_t {
    device_call(device, |dev| write_c_string(buf, length, &dev.uuid))
}

unsafe extern "C" fn stub_name(device: nvmlDevice_t, buf: *mut c_char, length: c_uint) -> nvmlReturn_t {
    device_call(device, |dev| write_c_string(buf, length, &dev.name))
}

unsafe extern "C" fn stub_memory_info(device: nvmlDevice_t, memory: *mut nvmlMemory_t) -> nvmlReturn_t {
    device_call(device, |dev| {
        let mut m: nvmlMemory_t = zeroed();
        m.total = dev.memory_total;
        m.used = dev.memory_used;
        m.free = dev.memory_total.saturating_sub(dev.memory_used);
        *memory = m;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_utilization_rates(
    device: nvmlDevice_t,
    utilization: *mut nvmlUtilization_t,
) -> nvmlReturn_t {
    device_call(device, |dev| {
        let mut u: nvmlUtilization_t = zeroed();
        u.gpu = dev.gpu_utilization;
        u.memory = dev.memory_utilization;
        *utilization = u;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_power_usage(device: nvmlDevice_t, value: *mut c_uint) -> nvmlReturn_t {
    device_call(device, |dev| {
        *value = dev.power_usage;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_temperature(
    device: nvmlDevice_t,
    sensor: nvmlTemperatureSensors_t,
    temp: *mut c_uint,
) -> nvmlReturn_t {
    device_call(device, |dev| {
        if sensor != NVML_TEMPERATURE_GPU {
            return NVML_ERROR_INVALID_ARGUMENT;
        }
        *temp = dev.temperature;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_fan_speed(device: nvmlDevice_t, value: *mut c_uint) -> nvmlReturn_t {
    device_call(device, |dev| {
        if dev.fan_status == NVML_SUCCESS {
            *value = dev.fan_speed;
        }
        dev.fan_status
    })
}

unsafe extern "C" fn stub_encoder_utilization(
    device: nvmlDevice_t,
    utilization: *mut c_uint,
    sampling_period_us: *mut c_uint,
) -> nvmlReturn_t {
    device_call(device, |dev| {
        *utilization = dev.encoder_utilization;
        *sampling_period_us = dev.codec_period_us;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_decoder_utilization(
    device: nvmlDevice_t,
    utilization: *mut c_uint,
    sampling_period_us: *mut c_uint,
) -> nvmlReturn_t {
    device_call(device, |dev| {
        *utilization = dev.decoder_utilization;
        *sampling_period_us = dev.codec_period_us;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_samples(
    device: nvmlDevice_t,
    kind: nvmlSamplingType_t,
    last_seen_timestamp: c_ulonglong,
    _value_type: *mut nvmlValueType_t,
    sample_count: *mut c_uint,
    samples: *mut nvmlSample_t,
) -> nvmlReturn_t {
    with_driver(|d| d.last_seen_timestamp = last_seen_timestamp);
    device_call(device, |dev| {
        let values = match kind {
            NVML_TOTAL_POWER_SAMPLES => &dev.power_samples,
            NVML_GPU_UTILIZATION_SAMPLES => &dev.utilization_samples,
            _ => return NVML_ERROR_NOT_SUPPORTED,
        };
        if values.is_empty() {
            *sample_count = 0;
            return dev.empty_window_status;
        }
        if samples.is_null() {
            *sample_count = values.len() as c_uint;
            return NVML_SUCCESS;
        }

        let reported = dev.fetch_reports.unwrap_or(values.len() as c_uint);
        let written = values.len().min(*sample_count as usize).min(reported as usize);
        for (i, &v) in values.iter().take(written).enumerate() {
            *samples.add(i) = nvmlSample_t {
                timeStamp: last_seen_timestamp + i as c_ulonglong + 1,
                sampleValue: nvmlValue_t { uiVal: v },
            };
        }
        *sample_count = reported;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_accounting_mode(
    device: nvmlDevice_t,
    mode: *mut nvmlEnableState_t,
) -> nvmlReturn_t {
    device_call(device, |dev| {
        *mode = if dev.accounting_enabled {
            NVML_FEATURE_ENABLED
        } else {
            NVML_FEATURE_DISABLED
        };
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_accounting_stats(
    device: nvmlDevice_t,
    pid: c_uint,
    stats: *mut nvmlAccountingStats_t,
) -> nvmlReturn_t {
    device_call(device, |dev| {
        if !dev.accounting_enabled {
            return NVML_ERROR_NOT_SUPPORTED;
        }
        if !dev.accounting_pids.contains(&pid) {
            return NVML_ERROR_NOT_FOUND;
        }
        let mut s: nvmlAccountingStats_t = zeroed();
        s.gpuUtilization = 50;
        s.memoryUtilization = 25;
        s.maxMemoryUsage = u64::from(pid) * 1024 * 1024;
        s.time = 0;
        s.startTime = 1_000_000;
        s.isRunning = 1;
        *stats = s;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_accounting_pids(
    device: nvmlDevice_t,
    count: *mut c_uint,
    pids: *mut c_uint,
) -> nvmlReturn_t {
    device_call(device, |dev| {
        if !dev.accounting_enabled {
            return NVML_ERROR_NOT_SUPPORTED;
        }
        let available = dev.accounting_pids.len();
        if pids.is_null() || (*count as usize) < available {
            *count = available as c_uint;
            return if available == 0 {
                NVML_SUCCESS
            } else {
                NVML_ERROR_INSUFFICIENT_SIZE
            };
        }
        for (i, &pid) in dev.accounting_pids.iter().enumerate() {
            *pids.add(i) = pid;
        }
        *count = available as c_uint;
        NVML_SUCCESS
    })
}

unsafe extern "C" fn stub_accounting_buffer_size(device: nvmlDevice_t, value: *mut c_uint) -> nvmlReturn_t {
    device_call(device, |dev| {
        if !dev.accounting_enabled {
            return NVML_ERROR_NOT_SUPPORTED;
        }
        *value = dev.accounting_buffer_size;
        NVML_SUCCESS
    })
}

/// Reports every slot it has, even beyond the caller's capacity
unsafe extern "C" fn stub_process_utilization(
    device: nvmlDevice_t,
    utilization: *mut nvmlProcessUtilizationSample_t,
    sample_count: *mut c_uint,
    last_seen_timestamp: c_ulonglong,
) -> nvmlReturn_t {
    with_driver(|d| d.last_seen_timestamp = last_seen_timestamp);
    device_call(device, |dev| {
        let available = dev.process_samples.len();
        if utilization.is_null() {
            *sample_count = available as c_uint;
            return NVML_ERROR_INSUFFICIENT_SIZE;
        }
        let capacity = *sample_count as usize;
        for (i, slot) in dev.process_samples.iter().take(capacity).enumerate() {
            let mut s: nvmlProcessUtilizationSample_t = zeroed();
            s.pid = slot.pid;
            s.timeStamp = last_seen_timestamp + 1;
            s.smUtil = slot.sm_util;
            s.memUtil = slot.mem_util;
            s.encUtil = slot.enc_util;
            s.decUtil = slot.dec_util;
            *utilization.add(i) = s;
        }
        *sample_count = available as c_uint;
        NVML_SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_resets_state() {
        install(StubDriver::default());
        with_driver(|d| d.native_calls = 7);
        install(StubDriver::default());
        assert_eq!(native_calls(), 0);
        assert_eq!(open_handles(), 0);
    }

    #[test]
    fn test_open_and_close_track_handles() {
        install(StubDriver::default());
        let lib = Box::new(StubLibrary::open().unwrap());
        assert_eq!(open_handles(), 1);
        lib.close().unwrap();
        assert_eq!(open_handles(), 0);
    }

    #[test]
    fn test_missing_symbol_is_not_exported() {
        install(StubDriver::default().without_symbol("nvmlDeviceGetName"));
        assert!(StubLibrary.symbol("nvmlDeviceGetName").is_none());
        assert!(StubLibrary.symbol("nvmlDeviceGetUUID").is_some());
        assert!(StubLibrary.symbol("nvmlNoSuchFunction").is_none());
    }
}
