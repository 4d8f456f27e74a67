//! nvprobe - NVML telemetry probe
//!
//! A command-line tool for reading NVIDIA GPU telemetry through a runtime
//! loaded management library.

use clap::Parser;
use nvprobe::cli::args::{generate_completions, Cli, Commands};
use nvprobe::commands::{run_accounting, run_info, run_list, run_processes};
use nvprobe::config::{Config, ConfigBuilder};
use nvprobe::error::{AppError, NvmlError};
use nvprobe::nvml::LibraryLoader;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Run the appropriate command
    let result = run(&cli);

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    if let Commands::Completions { shell } = &cli.command {
        generate_completions(*shell);
        return Ok(());
    }

    let config = load_config(cli)?;

    // Set log level based on verbose flag or config
    if config.general.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    let loader = LibraryLoader::new();

    match &cli.command {
        Commands::List => run_list(&loader, cli.format),

        Commands::Info(_) => run_info(&loader, &config, cli.format),

        Commands::Processes(_) => run_processes(&loader, &config, cli.format),

        Commands::Accounting => run_accounting(&loader, &config, cli.format),

        Commands::Completions { .. } => Ok(()),
    }
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let mut builder = ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_verbose(cli.verbose.then_some(true))
        .with_gpu(cli.gpu);

    match &cli.command {
        Commands::Info(args) => builder = builder.with_window(args.window),
        Commands::Processes(args) => {
            builder = builder.with_max_processes(args.max).with_since(args.since)
        }
        _ => {}
    }

    Ok(builder.build()?)
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Nvml(NvmlError::LibraryNotFound(_)) => {
            eprintln!();
            eprintln!("Hint: Make sure the NVIDIA driver is installed.");
            eprintln!("      On Linux, install the nvidia-utils package.");
        }
        AppError::Nvml(NvmlError::FunctionNotFound(name)) => {
            eprintln!();
            eprintln!("Hint: The installed driver does not export {}.", name);
            eprintln!("      Upgrade to a newer NVIDIA driver.");
        }
        AppError::Nvml(NvmlError::LibraryNotLoaded) => {
            eprintln!();
            eprintln!("Hint: NVML was shut down before the query completed.");
        }
        AppError::NoGpusFound => {
            eprintln!();
            eprintln!("Hint: Make sure you have an NVIDIA GPU installed.");
            eprintln!("      Check 'nvidia-smi' for GPU detection.");
        }
        _ => {}
    }
}
