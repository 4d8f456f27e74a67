//! Info command implementation
//!
//! Shows every metric of each GPU. A metric that cannot be read is reported
//! next to the others instead of aborting the report.

use std::time::Duration;

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, DeviceReport, Metric};
use crate::commands::select_devices;
use crate::config::Config;
use crate::error::Result;
use crate::nvml::{Device, LibraryLoader};

/// Execute the info command
pub fn run_info(loader: &LibraryLoader, config: &Config, format: OutputFormat) -> Result<()> {
    let _session = loader.session()?;
    let reports = collect_info(loader, config.general.gpu, config.sampling.window())?;

    print_output(&reports, format)?;

    Ok(())
}

/// Build a report per selected device
pub fn collect_info(
    loader: &LibraryLoader,
    gpu: Option<u32>,
    window: Duration,
) -> Result<Vec<DeviceReport>> {
    Ok(select_devices(loader, gpu)?
        .iter()
        .map(|device| device_report(device, window))
        .collect())
}

fn device_report(device: &Device<'_>, window: Duration) -> DeviceReport {
    let window_label = format!("{}s", window.as_secs());
    let memory = device.memory_info();

    let metrics = vec![
        Metric::from_result("Name", device.name()),
        Metric::from_result("UUID", device.uuid()),
        Metric::from_result("Minor Number", device.minor_number()),
        Metric::from_result("Memory", memory.clone()),
        Metric::from_result(
            "Memory Usage",
            memory.map(|m| format!("{}%", m.usage_percent())),
        ),
        Metric::from_result(
            "GPU Utilization",
            device.utilization_rates().map(|u| format!("{}%", u.gpu)),
        ),
        Metric::from_result(
            "Memory Utilization",
            device.utilization_rates().map(|u| format!("{}%", u.memory)),
        ),
        Metric::from_result("Power Usage", device.power_usage().map(format_milliwatts)),
        Metric::from_result("Temperature", device.temperature().map(|t| format!("{}°C", t))),
        Metric::from_result("Fan Speed", device.fan_speed().map(|s| format!("{}%", s))),
        Metric::from_result(
            "Encoder Utilization",
            device
                .encoder_utilization()
                .map(|u| format!("{}% ({} ms period)", u.utilization, u.sampling_period_ms())),
        ),
        Metric::from_result(
            "Decoder Utilization",
            device
                .decoder_utilization()
                .map(|u| format!("{}% ({} ms period)", u.utilization, u.sampling_period_ms())),
        ),
        Metric::from_result("Accounting Mode", device.accounting_mode()),
        Metric::from_result("Accounting Buffer Size", device.accounting_buffer_size()),
        Metric::from_result(
            &format!("Average Power ({})", window_label),
            device.average_power_usage(window).map(format_milliwatts),
        ),
        Metric::from_result(
            &format!("Average GPU Utilization ({})", window_label),
            device.average_gpu_utilization(window).map(|u| format!("{}%", u)),
        ),
    ];

    DeviceReport {
        gpu_index: device.index(),
        metrics,
    }
}

fn format_milliwatts(mw: u32) -> String {
    format!("{:.1} W", f64::from(mw) / 1000.0)
}
