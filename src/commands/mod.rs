//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command. Handlers
//! hold an NVML session for their whole run; the `collect_*` halves build the
//! output without printing so they can be driven against a stub library.

pub mod accounting;
pub mod info;
pub mod list;
pub mod processes;

pub use accounting::run_accounting;
pub use info::run_info;
pub use list::run_list;
pub use processes::run_processes;

use crate::error::{AppError, Result};
use crate::nvml::{Device, LibraryLoader};

/// The device chosen with `--gpu`, or every device
pub(crate) fn select_devices(loader: &LibraryLoader, gpu: Option<u32>) -> Result<Vec<Device<'_>>> {
    let count = loader.device_count()?;
    if count == 0 {
        return Err(AppError::NoGpusFound);
    }

    match gpu {
        Some(index) if index >= count => Err(AppError::GpuNotFound { index, count }),
        Some(index) => Ok(vec![loader.device_by_index(index)?]),
        None => Ok(loader.all_devices()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, StubDevice, StubDriver};

    #[test]
    fn test_select_devices() {
        mock::install(
            StubDriver::default()
                .with_device(StubDevice::new(0))
                .with_device(StubDevice::new(1)),
        );
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        assert_eq!(select_devices(&loader, None).unwrap().len(), 2);
        let one = select_devices(&loader, Some(1)).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].index(), 1);
        assert!(matches!(
            select_devices(&loader, Some(2)),
            Err(AppError::GpuNotFound { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_select_devices_without_gpus() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        assert!(matches!(select_devices(&loader, None), Err(AppError::NoGpusFound)));
    }
}
