//! Processes command implementation
//!
//! Lists per-process utilization on each GPU, busiest first.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, ProcessEntry, ProcessListOutput};
use crate::commands::select_devices;
use crate::config::{Config, ProcessesConfig};
use crate::domain::process::sorted_by_sm;
use crate::error::{NvmlError, Result};
use crate::nvml::ffi::NVML_ERROR_NOT_FOUND;
use crate::nvml::LibraryLoader;

/// Execute the processes command
pub fn run_processes(loader: &LibraryLoader, config: &Config, format: OutputFormat) -> Result<()> {
    let _session = loader.session()?;
    let outputs = collect_processes(loader, config.general.gpu, &config.processes)?;

    print_output(&outputs, format)?;

    Ok(())
}

/// Build the process list of each selected device
pub fn collect_processes(
    loader: &LibraryLoader,
    gpu: Option<u32>,
    settings: &ProcessesConfig,
) -> Result<Vec<ProcessListOutput>> {
    let mut outputs = Vec::new();

    for device in select_devices(loader, gpu)? {
        let gpu_name = device.name()?;

        let samples = match device.process_utilization(settings.max_count, settings.since()) {
            Ok(samples) => samples,
            // No process ran within the window
            Err(NvmlError::Native { code, .. }) if code == NVML_ERROR_NOT_FOUND => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let processes = sorted_by_sm(&samples)
            .into_iter()
            .map(|sample| {
                let name = loader
                    .system_process_name(sample.pid, settings.name_buffer_size)
                    .unwrap_or_else(|e| {
                        log::debug!("No name for pid {}: {}", sample.pid, e);
                        "[unknown]".to_string()
                    });
                ProcessEntry::new(sample, name)
            })
            .collect();

        outputs.push(ProcessListOutput {
            gpu_name,
            gpu_index: device.index(),
            since_seconds: settings.since_seconds,
            processes,
        });
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, StubDevice, StubDriver, StubProcessSample};

    #[test]
    fn test_collect_processes() {
        mock::install(
            StubDriver::default()
                .with_process_name(11, "blender")
                .with_process_name(12, "python3")
                .with_device(StubDevice::new(0).with_process_samples(vec![
                    StubProcessSample::new(11, 20),
                    StubProcessSample::new(0, 0),
                    StubProcessSample::new(12, 60),
                    StubProcessSample::new(13, 5),
                ])),
        );
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        let outputs = collect_processes(&loader, None, &ProcessesConfig::default()).unwrap();
        assert_eq!(outputs.len(), 1);

        let processes = &outputs[0].processes;
        let pids: Vec<u32> = processes.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![12, 11, 13]);
        assert_eq!(processes[0].name, "python3");
        assert_eq!(processes[2].name, "[unknown]");
    }

    #[test]
    fn test_collect_processes_respects_max_count() {
        mock::install(StubDriver::default().with_device(StubDevice::new(0).with_process_samples(
            (1..=10).map(|pid| StubProcessSample::new(pid, pid)).collect(),
        )));
        let loader = mock::stub_loader();
        let _session = loader.session().unwrap();

        let settings = ProcessesConfig {
            max_count: 4,
            ..ProcessesConfig::default()
        };
        let outputs = collect_processes(&loader, Some(0), &settings).unwrap();
        assert_eq!(outputs[0].processes.len(), 4);
    }
}
