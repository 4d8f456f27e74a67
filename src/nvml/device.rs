//! NVML device handle and per-device queries
//!
//! Every query goes through the loader's guarded access: it fails fast with
//! `LibraryNotLoaded` before touching any native resource when the library is
//! not loaded, or was reloaded since the handle was obtained, and keeps the
//! library loaded for the duration of the call.

use std::ffi::{c_char, c_uint};
use std::fmt;
use std::ptr;
use std::time::Duration;

use crate::domain::{
    AccountingMode, AccountingPids, AccountingStats, CodecUtilization, GpuInfo, MemoryInfo,
    ProcessUtilizationSample, UtilizationRates,
};
use crate::error::NvmlError;
use crate::nvml::ffi::*;
use crate::nvml::loader::{LibraryLoader, Loaded};
use crate::nvml::sampling::last_seen_timestamp;
use crate::nvml::symbols::{Symbol, SymbolTable};

/// Handle to one GPU, obtained from [`LibraryLoader::device_by_index`]
///
/// Cheap to copy and owns nothing: the underlying handle is managed by the
/// driver and is only usable while the load it came from stays initialized.
/// After a shutdown and a fresh initialize, obtain the device again.
#[derive(Clone, Copy)]
pub struct Device<'a> {
    loader: &'a LibraryLoader,
    raw: nvmlDevice_t,
    index: u32,
    generation: u64,
}

// SAFETY: nvmlDevice_t is an opaque driver handle; NVML is thread-safe and the
// handle is never dereferenced on the Rust side.
unsafe impl Send for Device<'_> {}
// SAFETY: see above.
unsafe impl Sync for Device<'_> {}

impl<'a> Device<'a> {
    pub(crate) fn new(
        loader: &'a LibraryLoader,
        raw: nvmlDevice_t,
        index: u32,
        generation: u64,
    ) -> Self {
        Self {
            loader,
            raw,
            index,
            generation,
        }
    }

    /// Enumeration index this handle was obtained with
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The loader this device belongs to
    pub fn loader(&self) -> &'a LibraryLoader {
        self.loader
    }

    pub(crate) fn raw(&self) -> nvmlDevice_t {
        self.raw
    }

    /// Run `f` against the library this handle was obtained from
    pub(crate) fn with_library<T>(
        &self,
        f: impl FnOnce(&Loaded) -> Result<T, NvmlError>,
    ) -> Result<T, NvmlError> {
        self.loader.with_generation(self.generation, f)
    }

    /// Identification summary (name, UUID, minor number)
    pub fn info(&self) -> Result<GpuInfo, NvmlError> {
        let info = GpuInfo::new(self.index, self.name()?, self.uuid()?);
        Ok(match self.minor_number() {
            Ok(minor) => info.with_minor_number(minor),
            Err(e) => {
                log::debug!("GPU {}: minor number unavailable: {}", self.index, e);
                info
            }
        })
    }

    /// Minor number of the device node (`/dev/nvidia<minor>`)
    pub fn minor_number(&self) -> Result<u32, NvmlError> {
        self.query_uint(|s| s.device_get_minor_number)
    }

    /// Globally unique, immutable UUID of the device
    pub fn uuid(&self) -> Result<String, NvmlError> {
        self.query_string(|s| s.device_get_uuid, DEVICE_UUID_BUFFER_SIZE)
    }

    /// Product name
    pub fn name(&self) -> Result<String, NvmlError> {
        self.query_string(|s| s.device_get_name, DEVICE_NAME_BUFFER_SIZE)
    }

    /// Total and used framebuffer memory
    pub fn memory_info(&self) -> Result<MemoryInfo, NvmlError> {
        self.with_library(|lib| {
            let f = lib.symbols.device_get_memory_info.get()?;
            let mut memory: nvmlMemory_t = zeroed();
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(self.raw, &mut memory) })?;
            Ok(MemoryInfo::new(memory.total, memory.used))
        })
    }

    /// GPU and memory utilization over the driver's last sample period
    pub fn utilization_rates(&self) -> Result<UtilizationRates, NvmlError> {
        self.with_library(|lib| {
            let f = lib.symbols.device_get_utilization_rates.get()?;
            let mut utilization: nvmlUtilization_t = zeroed();
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(self.raw, &mut utilization) })?;
            Ok(UtilizationRates::new(utilization.gpu, utilization.memory))
        })
    }

    /// Power draw of the board in milliwatts (+/- 5%)
    pub fn power_usage(&self) -> Result<u32, NvmlError> {
        self.query_uint(|s| s.device_get_power_usage)
    }

    /// GPU die temperature in degrees Celsius
    pub fn temperature(&self) -> Result<u32, NvmlError> {
        self.with_library(|lib| {
            let f = lib.symbols.device_get_temperature.get()?;
            let mut temp: c_uint = 0;
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(self.raw, NVML_TEMPERATURE_GPU, &mut temp) })?;
            Ok(temp)
        })
    }

    /// Fan speed as a percentage of its maximum
    pub fn fan_speed(&self) -> Result<u32, NvmlError> {
        self.query_uint(|s| s.device_get_fan_speed)
    }

    /// Video encoder utilization and its sampling period
    pub fn encoder_utilization(&self) -> Result<CodecUtilization, NvmlError> {
        self.query_codec(|s| s.device_get_encoder_utilization)
    }

    /// Video decoder utilization and its sampling period
    pub fn decoder_utilization(&self) -> Result<CodecUtilization, NvmlError> {
        self.query_codec(|s| s.device_get_decoder_utilization)
    }

    /// Whether per-process accounting is enabled
    pub fn accounting_mode(&self) -> Result<AccountingMode, NvmlError> {
        self.with_library(|lib| {
            let f = lib.symbols.device_get_accounting_mode.get()?;
            let mut mode: nvmlEnableState_t = zeroed();
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(self.raw, &mut mode) })?;
            Ok(if mode == NVML_FEATURE_ENABLED {
                AccountingMode::Enabled
            } else {
                AccountingMode::Disabled
            })
        })
    }

    /// Number of processes the accounting circular buffer can hold
    pub fn accounting_buffer_size(&self) -> Result<u32, NvmlError> {
        self.query_uint(|s| s.device_get_accounting_buffer_size)
    }

    /// Accounting statistics retained for `pid`
    pub fn accounting_stats(&self, pid: u32) -> Result<AccountingStats, NvmlError> {
        self.with_library(|lib| {
            let f = lib.symbols.device_get_accounting_stats.get()?;
            let mut stats: nvmlAccountingStats_t = zeroed();
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(self.raw, pid, &mut stats) })?;
            Ok(AccountingStats {
                gpu_utilization: stats.gpuUtilization,
                memory_utilization: stats.memoryUtilization,
                max_memory_usage: stats.maxMemoryUsage,
                time_ms: stats.time,
                start_time_us: stats.startTime,
                is_running: stats.isRunning != 0,
                reserved: stats.reserved,
            })
        })
    }

    /// Pids that accounting stats can be queried for
    ///
    /// With `max_count == 0` no pids are returned and `count` is the number
    /// available. Otherwise up to `max_count` pids are returned and `count`
    /// is the number returned. The driver rejects a buffer smaller than the
    /// number available, so when more pids exist than were asked for, all of
    /// them are read and the first `max_count` kept.
    pub fn accounting_pids(&self, max_count: u32) -> Result<AccountingPids, NvmlError> {
        self.with_library(|lib| {
            let f = lib.symbols.device_get_accounting_pids.get()?;
            let mut count: c_uint = max_count;

            if max_count == 0 {
                // SAFETY: library held loaded; a null buffer asks for the count only.
                let code = unsafe { f(self.raw, &mut count, ptr::null_mut()) };
                // The driver reports the probe as "insufficient size" while still setting count
                if code != NVML_ERROR_INSUFFICIENT_SIZE {
                    lib.check(code)?;
                }
                return Ok(AccountingPids {
                    pids: Vec::new(),
                    count,
                });
            }

            let mut pids: Vec<c_uint> = vec![0; max_count as usize];
            // SAFETY: library held loaded; `pids` holds `count` elements.
            let mut code = unsafe { f(self.raw, &mut count, pids.as_mut_ptr()) };
            if code == NVML_ERROR_INSUFFICIENT_SIZE && count > max_count {
                log::debug!(
                    "GPU {}: {} accounting pids available, {} requested",
                    self.index,
                    count,
                    max_count
                );
                pids = vec![0; count as usize];
                // SAFETY: as above, with `pids` resized to `count` elements.
                code = unsafe { f(self.raw, &mut count, pids.as_mut_ptr()) };
            }
            lib.check(code)?;
            let filled = count.min(max_count).min(pids.len() as c_uint);
            pids.truncate(filled as usize);
            Ok(AccountingPids {
                pids,
                count: filled,
            })
        })
    }

    /// Per-process utilization samples seen within the last `since`
    ///
    /// At most `max_count` samples are returned. Slots the driver marks with a
    /// zero pid are dropped.
    pub fn process_utilization(
        &self,
        max_count: u32,
        since: Duration,
    ) -> Result<Vec<ProcessUtilizationSample>, NvmlError> {
        self.with_library(|lib| {
            if max_count == 0 {
                return Err(NvmlError::InvalidInput(
                    "process count must be greater than zero".to_string(),
                ));
            }
            let f = lib.symbols.device_get_process_utilization.get()?;

            let mut samples: Vec<nvmlProcessUtilizationSample_t> =
                vec![zeroed(); max_count as usize];
            let mut count: c_uint = max_count;
            let last_seen = last_seen_timestamp(since);
            // SAFETY: library held loaded; `samples` holds `count` elements.
            lib.check(unsafe { f(self.raw, samples.as_mut_ptr(), &mut count, last_seen) })?;

            if count > max_count {
                log::debug!(
                    "GPU {}: driver reported {} process samples, buffer holds {}",
                    self.index,
                    count,
                    max_count
                );
            }
            let filled = count.min(max_count) as usize;

            Ok(samples[..filled]
                .iter()
                .filter(|s| s.pid > 0)
                .map(|s| ProcessUtilizationSample {
                    pid: s.pid,
                    timestamp_us: s.timeStamp,
                    sm_util: s.smUtil,
                    mem_util: s.memUtil,
                    enc_util: s.encUtil,
                    dec_util: s.decUtil,
                })
                .collect())
        })
    }

    fn query_uint(
        &self,
        pick: impl FnOnce(&SymbolTable) -> Symbol<FnDeviceGetUint>,
    ) -> Result<u32, NvmlError> {
        self.with_library(|lib| {
            let f = pick(&lib.symbols).get()?;
            let mut value: c_uint = 0;
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(self.raw, &mut value) })?;
            Ok(value)
        })
    }

    fn query_string(
        &self,
        pick: impl FnOnce(&SymbolTable) -> Symbol<FnDeviceGetString>,
        size: usize,
    ) -> Result<String, NvmlError> {
        self.with_library(|lib| {
            let f = pick(&lib.symbols).get()?;
            read_string(lib, size, |buf, len| {
                // SAFETY: library held loaded; `buf` holds `len` bytes.
                unsafe { f(self.raw, buf, len) }
            })
        })
    }

    fn query_codec(
        &self,
        pick: impl FnOnce(&SymbolTable) -> Symbol<FnDeviceGetCodecUtilization>,
    ) -> Result<CodecUtilization, NvmlError> {
        self.with_library(|lib| {
            let f = pick(&lib.symbols).get()?;
            let mut utilization: c_uint = 0;
            let mut period_us: c_uint = 0;
            // SAFETY: library held loaded, out-pointers valid for the call.
            lib.check(unsafe { f(self.raw, &mut utilization, &mut period_us) })?;
            Ok(CodecUtilization::new(utilization, period_us))
        })
    }
}

impl fmt::Debug for Device<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("index", &self.index)
            .field("raw", &self.raw)
            .finish()
    }
}

/// Fill a fixed-size C string buffer through `call` and convert it
pub(crate) fn read_string(
    lib: &Loaded,
    size: usize,
    call: impl FnOnce(*mut c_char, c_uint) -> nvmlReturn_t,
) -> Result<String, NvmlError> {
    let mut buf: Vec<c_char> = vec![0; size];
    lib.check(call(buf.as_mut_ptr(), size as c_uint))?;
    Ok(c_buffer_to_string(&buf))
}
