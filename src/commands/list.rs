//! List command implementation
//!
//! Lists the driver version and all detected NVIDIA GPUs.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, GpuList, GpuListEntry};
use crate::error::Result;
use crate::nvml::LibraryLoader;

/// Execute the list command
pub fn run_list(loader: &LibraryLoader, format: OutputFormat) -> Result<()> {
    let _session = loader.session()?;
    let gpu_list = collect_list(loader)?;

    print_output(&gpu_list, format)?;

    Ok(())
}

/// Build the GPU list
pub fn collect_list(loader: &LibraryLoader) -> Result<GpuList> {
    let driver_version = loader.system_driver_version()?;

    let gpus = loader
        .all_devices()?
        .iter()
        .map(|device| device.info().map(|info| GpuListEntry::from(&info)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(GpuList {
        gpus,
        driver_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, NvmlError};
    use crate::mock::{self, StubDevice, StubDriver};

    #[test]
    fn test_collect_list() {
        mock::install(
            StubDriver::default()
                .with_driver_version("460.32.03")
                .with_device(StubDevice::new(0).with_name("Tesla T4"))
                .with_device(StubDevice::new(1).with_name("Tesla V100")),
        );
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        let list = collect_list(&loader).unwrap();
        assert_eq!(list.driver_version, "460.32.03");
        assert_eq!(list.gpus.len(), 2);
        assert_eq!(list.gpus[1].name, "Tesla V100");
        assert_eq!(list.gpus[1].minor_number, Some(1));
        assert_eq!(list.gpus[0].uuid, "GPU-00000000-stub");
    }

    #[test]
    fn test_collect_list_requires_session() {
        mock::install(StubDriver::default().with_device(StubDevice::new(0)));
        let loader = mock::stub_loader();

        assert!(matches!(
            collect_list(&loader),
            Err(AppError::Nvml(NvmlError::LibraryNotLoaded))
        ));
    }
}
