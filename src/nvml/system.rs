//! System-level queries and device enumeration

use std::ffi::c_uint;

use crate::error::NvmlError;
use crate::nvml::device::{read_string, Device};
use crate::nvml::ffi::*;
use crate::nvml::loader::LibraryLoader;

impl LibraryLoader {
    /// Version of the installed display driver
    pub fn system_driver_version(&self) -> Result<String, NvmlError> {
        self.with_loaded(|lib| {
            let f = lib.symbols.system_get_driver_version.get()?;
            read_string(lib, DRIVER_VERSION_BUFFER_SIZE, |buf, len| {
                // SAFETY: library held loaded; `buf` holds `len` bytes.
                unsafe { f(buf, len) }
            })
        })
    }

    /// Number of GPUs visible to the driver
    pub fn device_count(&self) -> Result<u32, NvmlError> {
        self.with_loaded(|lib| {
            let f = lib.symbols.device_get_count.get()?;
            let mut count: c_uint = 0;
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(&mut count) })?;
            Ok(count)
        })
    }

    /// Handle for the GPU at `index`, in `[0, device_count())`
    ///
    /// Enumeration order is not stable across reboots or processes; use the
    /// device UUID to identify a GPU.
    pub fn device_by_index(&self, index: u32) -> Result<Device<'_>, NvmlError> {
        self.with_loaded(|lib| {
            let f = lib.symbols.device_get_handle_by_index.get()?;
            let mut raw: nvmlDevice_t = std::ptr::null_mut();
            // SAFETY: library held loaded, out-pointer valid for the call.
            lib.check(unsafe { f(index, &mut raw) })?;
            Ok(Device::new(self, raw, index, lib.generation()))
        })
    }

    /// Handles for every GPU, in enumeration order
    pub fn all_devices(&self) -> Result<Vec<Device<'_>>, NvmlError> {
        (0..self.device_count()?)
            .map(|index| self.device_by_index(index))
            .collect()
    }

    /// Name of the process with `pid`, read into a buffer of `buffer_size` bytes
    pub fn system_process_name(&self, pid: u32, buffer_size: u32) -> Result<String, NvmlError> {
        self.with_loaded(|lib| {
            if buffer_size == 0 {
                return Err(NvmlError::InvalidInput(
                    "process name buffer size must be greater than zero".to_string(),
                ));
            }
            let f = lib.symbols.system_get_process_name.get()?;
            read_string(lib, buffer_size as usize, |buf, len| {
                // SAFETY: library held loaded; `buf` holds `len` bytes.
                unsafe { f(pid, buf, len) }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::NvmlError;
    use crate::mock::{self, StubDevice, StubDriver};
    use crate::nvml::ffi::NVML_ERROR_INVALID_ARGUMENT;

    #[test]
    fn test_driver_version() {
        mock::install(StubDriver::default().with_driver_version("460.32.03"));
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        assert_eq!(loader.system_driver_version().unwrap(), "460.32.03");
    }

    #[test]
    fn test_enumeration() {
        mock::install(
            StubDriver::default()
                .with_device(StubDevice::new(0))
                .with_device(StubDevice::new(1)),
        );
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        assert_eq!(loader.device_count().unwrap(), 2);
        let devices = loader.all_devices().unwrap();
        let indices: Vec<u32> = devices.iter().map(|d| d.index()).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_device_index_out_of_range() {
        mock::install(StubDriver::default().with_device(StubDevice::new(0)));
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        let err = loader.device_by_index(5).unwrap_err();
        assert_eq!(err.code(), Some(NVML_ERROR_INVALID_ARGUMENT));
    }

    #[test]
    fn test_system_queries_while_unloaded() {
        mock::install(StubDriver::default().with_device(StubDevice::new(0)));
        let loader = mock::stub_loader();

        assert_eq!(loader.system_driver_version(), Err(NvmlError::LibraryNotLoaded));
        assert_eq!(loader.device_count(), Err(NvmlError::LibraryNotLoaded));
        assert!(matches!(loader.device_by_index(0), Err(NvmlError::LibraryNotLoaded)));
        assert!(matches!(loader.all_devices(), Err(NvmlError::LibraryNotLoaded)));
        assert_eq!(loader.system_process_name(1, 64), Err(NvmlError::LibraryNotLoaded));
        assert_eq!(mock::native_calls(), 0);
    }

    #[test]
    fn test_process_name() {
        mock::install(StubDriver::default().with_process_name(4242, "python3"));
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        assert_eq!(loader.system_process_name(4242, 256).unwrap(), "python3");
        // Truncated to the buffer, keeping the terminator
        assert_eq!(loader.system_process_name(4242, 4).unwrap(), "pyt");
        assert!(loader.system_process_name(1, 256).is_err());
    }

    #[test]
    fn test_process_name_rejects_empty_buffer() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        let calls_before = mock::native_calls();
        let err = loader.system_process_name(4242, 0).unwrap_err();
        assert!(matches!(err, NvmlError::InvalidInput(_)));
        assert_eq!(mock::native_calls(), calls_before);
    }
}
