//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::domain::{AccountingStats, GpuInfo, ProcessUtilizationSample};
use serde::Serialize;
use std::fmt::Display;
use std::io::{self, Write};

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
            writeln!(handle, "{}", json)?;
        }
        OutputFormat::Compact => {
            writeln!(handle, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().replace('\n', " | ")
    }
}

impl<T: TableDisplay> TableDisplay for Vec<T> {
    fn to_table(&self) -> String {
        self.iter()
            .map(|item| item.to_table())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_compact(&self) -> String {
        self.iter()
            .map(|item| item.to_compact())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// GPU list entry for display
#[derive(Debug, Clone, Serialize)]
pub struct GpuListEntry {
    pub index: u32,
    pub name: String,
    pub uuid: String,
    pub minor_number: Option<u32>,
}

impl From<&GpuInfo> for GpuListEntry {
    fn from(info: &GpuInfo) -> Self {
        Self {
            index: info.index,
            name: info.name.clone(),
            uuid: info.uuid.clone(),
            minor_number: info.minor_number,
        }
    }
}

impl TableDisplay for GpuListEntry {
    fn to_table(&self) -> String {
        let minor = self
            .minor_number
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[{}] {} (Minor: {}, UUID: {})",
            self.index, self.name, minor, self.uuid
        )
    }

    fn to_compact(&self) -> String {
        format!("{}:{}", self.index, self.name)
    }
}

/// GPU list for display
#[derive(Debug, Clone, Serialize)]
pub struct GpuList {
    pub gpus: Vec<GpuListEntry>,
    pub driver_version: String,
}

impl TableDisplay for GpuList {
    fn to_table(&self) -> String {
        let mut output = format!("Driver Version: {}\n", self.driver_version);
        output.push_str(&format!("GPUs Found: {}\n\n", self.gpus.len()));

        for gpu in &self.gpus {
            output.push_str(&gpu.to_table());
            output.push('\n');
        }

        output
    }

    fn to_compact(&self) -> String {
        self.gpus
            .iter()
            .map(|g| g.to_compact())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One metric of a device report: a formatted value or the error that prevented it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Metric {
    /// Record the outcome of a query
    pub fn from_result<T: Display, E: Display>(name: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self {
                name: name.to_string(),
                value: Some(v.to_string()),
                error: None,
            },
            Err(e) => Self {
                name: name.to_string(),
                value: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Every metric of one GPU
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub gpu_index: u32,
    pub metrics: Vec<Metric>,
}

impl DeviceReport {
    /// Value of the metric called `name`, if it was read
    pub fn value(&self, name: &str) -> Option<&str> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.value.as_deref())
    }
}

impl TableDisplay for DeviceReport {
    fn to_table(&self) -> String {
        let mut output = format!("GPU {}\n", self.gpu_index);
        let width = self.metrics.iter().map(|m| m.name.len()).max().unwrap_or(0);

        for metric in &self.metrics {
            let shown = match (&metric.value, &metric.error) {
                (Some(v), _) => v.clone(),
                (None, Some(e)) => format!("error: {}", e),
                (None, None) => "-".to_string(),
            };
            output.push_str(&format!("  {:<width$}  {}\n", metric.name, shown, width = width));
        }

        output
    }

    fn to_compact(&self) -> String {
        let values: Vec<String> = self
            .metrics
            .iter()
            .filter_map(|m| m.value.as_ref().map(|v| format!("{}={}", m.name, v)))
            .collect();
        format!("GPU {}: {}", self.gpu_index, values.join(", "))
    }
}

/// Process list output
#[derive(Debug, Clone, Serialize)]
pub struct ProcessListOutput {
    pub gpu_name: String,
    pub gpu_index: u32,
    pub since_seconds: u64,
    pub processes: Vec<ProcessEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub sm_util: u32,
    pub mem_util: u32,
    pub enc_util: u32,
    pub dec_util: u32,
    pub timestamp_us: u64,
}

impl ProcessEntry {
    pub fn new(sample: &ProcessUtilizationSample, name: String) -> Self {
        Self {
            pid: sample.pid,
            name,
            sm_util: sample.sm_util,
            mem_util: sample.mem_util,
            enc_util: sample.enc_util,
            dec_util: sample.dec_util,
            timestamp_us: sample.timestamp_us,
        }
    }
}

impl TableDisplay for ProcessListOutput {
    fn to_table(&self) -> String {
        let mut output = format!("[{}] {}\n", self.gpu_index, self.gpu_name);
        output.push_str(&format!(
            "  Processes: {} (last {}s)\n\n",
            self.processes.len(),
            self.since_seconds
        ));

        if self.processes.is_empty() {
            output.push_str("  No process activity in window\n");
            return output;
        }

        // Table header
        output.push_str("  PID      SM    MEM   ENC   DEC   Name\n");
        output.push_str("  ────────────────────────────────────────────────────────────\n");

        // Table rows
        for process in &self.processes {
            output.push_str(&format!(
                "  {:<8} {:<5} {:<5} {:<5} {:<5} {}\n",
                process.pid,
                format!("{}%", process.sm_util),
                format!("{}%", process.mem_util),
                format!("{}%", process.enc_util),
                format!("{}%", process.dec_util),
                process.name
            ));
        }

        output
    }

    fn to_compact(&self) -> String {
        if self.processes.is_empty() {
            format!("GPU {}: No processes", self.gpu_index)
        } else {
            format!(
                "GPU {}: {} processes, busiest pid {}",
                self.gpu_index,
                self.processes.len(),
                self.processes[0].pid
            )
        }
    }
}

/// Accounting data of one GPU
#[derive(Debug, Clone, Serialize)]
pub struct AccountingOutput {
    pub gpu_name: String,
    pub gpu_index: u32,
    pub enabled: bool,
    pub buffer_size: Option<u32>,
    pub pids_available: u32,
    pub entries: Vec<AccountingEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountingEntry {
    pub pid: u32,
    pub stats: AccountingStats,
}

impl TableDisplay for AccountingOutput {
    fn to_table(&self) -> String {
        let mut output = format!("[{}] {}\n", self.gpu_index, self.gpu_name);

        if !self.enabled {
            output.push_str("  Accounting: Disabled\n");
            return output;
        }

        output.push_str("  Accounting: Enabled\n");
        if let Some(size) = self.buffer_size {
            output.push_str(&format!("  Buffer Size: {} processes\n", size));
        }
        output.push_str(&format!("  Pids Retained: {}\n", self.pids_available));

        if self.entries.is_empty() {
            return output;
        }

        output.push('\n');
        output.push_str("  PID      GPU   MEM   Max Memory   Time      State\n");
        output.push_str("  ────────────────────────────────────────────────────────────\n");
        for entry in &self.entries {
            let stats = &entry.stats;
            output.push_str(&format!(
                "  {:<8} {:<5} {:<5} {:<12} {:<9} {}\n",
                entry.pid,
                format!("{}%", stats.gpu_utilization),
                format!("{}%", stats.memory_utilization),
                format!("{} MiB", stats.max_memory_usage / (1024 * 1024)),
                format!("{} ms", stats.time_ms),
                if stats.is_running { "running" } else { "exited" }
            ));
        }

        output
    }

    fn to_compact(&self) -> String {
        if self.enabled {
            format!("GPU {}: accounting on, {} pids", self.gpu_index, self.pids_available)
        } else {
            format!("GPU {}: accounting off", self.gpu_index)
        }
    }
}
