//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// NVML telemetry probe
///
/// Loads the NVIDIA management library at runtime and reports device,
/// sampling and per-process telemetry.
#[derive(Parser, Debug)]
#[command(name = "nvprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "NVPROBE_CONFIG")]
    pub config: Option<String>,

    /// Target GPU by index (0-based)
    #[arg(long, global = true)]
    pub gpu: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the driver version and all detected GPUs
    List,

    /// Show every metric of each GPU, with sampled averages
    Info(InfoArgs),

    /// Show per-process utilization
    Processes(ProcessesArgs),

    /// Show per-process accounting data
    Accounting,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the info command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Averaging window in seconds
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub window: Option<u64>,
}

/// Arguments for the processes command
#[derive(Parser, Debug)]
pub struct ProcessesArgs {
    /// Maximum number of processes per GPU
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max: Option<u32>,

    /// Only show samples from the last N seconds
    #[arg(short, long)]
    pub since: Option<u64>,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_list() {
        let args = Cli::try_parse_from(["nvprobe", "list"]).unwrap();
        assert!(matches!(args.command, Commands::List));
    }

    #[test]
    fn test_cli_parse_verbose() {
        let args = Cli::try_parse_from(["nvprobe", "-v", "list"]).unwrap();
        assert!(args.verbose);
    }

    #[test]
    fn test_cli_parse_gpu_selection() {
        let args = Cli::try_parse_from(["nvprobe", "--gpu", "1", "accounting"]).unwrap();
        assert_eq!(args.gpu, Some(1));
        assert!(matches!(args.command, Commands::Accounting));
    }

    #[test]
    fn test_cli_parse_info_window() {
        let args = Cli::try_parse_from(["nvprobe", "info", "--window", "30"]).unwrap();
        if let Commands::Info(info) = args.command {
            assert_eq!(info.window, Some(30));
        } else {
            panic!("Expected Info command");
        }
    }

    #[test]
    fn test_cli_info_window_validation() {
        // Empty windows hold no samples
        let result = Cli::try_parse_from(["nvprobe", "info", "--window", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_processes() {
        let args =
            Cli::try_parse_from(["nvprobe", "--format", "json", "processes", "--max", "8", "-s", "3"])
                .unwrap();
        assert!(matches!(args.format, OutputFormat::Json));
        if let Commands::Processes(p) = args.command {
            assert_eq!(p.max, Some(8));
            assert_eq!(p.since, Some(3));
        } else {
            panic!("Expected Processes command");
        }
    }

    #[test]
    fn test_cli_processes_max_validation() {
        let result = Cli::try_parse_from(["nvprobe", "processes", "--max", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
