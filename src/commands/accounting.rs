//! Accounting command implementation
//!
//! Shows accounting mode, buffer capacity and retained per-process stats.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, AccountingEntry, AccountingOutput};
use crate::commands::select_devices;
use crate::config::Config;
use crate::error::{NvmlError, Result};
use crate::nvml::ffi::NVML_ERROR_NOT_SUPPORTED;
use crate::nvml::{Device, LibraryLoader};

/// Execute the accounting command
pub fn run_accounting(loader: &LibraryLoader, config: &Config, format: OutputFormat) -> Result<()> {
    let _session = loader.session()?;
    let outputs = collect_accounting(loader, config.general.gpu)?;

    print_output(&outputs, format)?;

    Ok(())
}

/// Build the accounting summary of each selected device
pub fn collect_accounting(loader: &LibraryLoader, gpu: Option<u32>) -> Result<Vec<AccountingOutput>> {
    select_devices(loader, gpu)?
        .iter()
        .map(device_accounting)
        .collect()
}

fn device_accounting(device: &Device<'_>) -> Result<AccountingOutput> {
    let gpu_name = device.name()?;

    let enabled = match device.accounting_mode() {
        Ok(mode) => mode.is_enabled(),
        Err(NvmlError::Native { code, .. }) if code == NVML_ERROR_NOT_SUPPORTED => false,
        Err(e) => return Err(e.into()),
    };

    if !enabled {
        return Ok(AccountingOutput {
            gpu_name,
            gpu_index: device.index(),
            enabled,
            buffer_size: None,
            pids_available: 0,
            entries: Vec::new(),
        });
    }

    let buffer_size = device.accounting_buffer_size().ok();

    // Probe for the count, then fetch that many
    let available = device.accounting_pids(0)?.count;
    let pids = if available > 0 {
        device.accounting_pids(available)?.pids
    } else {
        Vec::new()
    };

    let entries = pids
        .into_iter()
        .filter_map(|pid| match device.accounting_stats(pid) {
            Ok(stats) => Some(AccountingEntry { pid, stats }),
            Err(e) => {
                // The circular buffer may have dropped it since the fetch
                log::debug!("No accounting stats for pid {}: {}", pid, e);
                None
            }
        })
        .collect();

    Ok(AccountingOutput {
        gpu_name,
        gpu_index: device.index(),
        enabled,
        buffer_size,
        pids_available: available,
        entries,
    })
}
