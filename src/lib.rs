//! nvprobe - runtime-loaded NVML telemetry library
//!
//! This library loads NVIDIA's management library at runtime, resolves its
//! entry points into a typed table and exposes device, accounting,
//! per-process and sampled telemetry queries over it.
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`domain`]: Domain models marshaled from native structs
//! - [`error`]: Error types
//! - [`nvml`]: Library loader, symbol table and device queries
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use nvprobe::LibraryLoader;
//!
//! let loader = LibraryLoader::new();
//! let _session = loader.session()?;
//! for device in loader.all_devices()? {
//!     let power = device.average_power_usage(Duration::from_secs(10))?;
//!     println!("{}: {} mW", device.name()?, power);
//! }
//! # Ok::<(), nvprobe::NvmlError>(())
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod nvml;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, NvmlError, Result};
pub use nvml::{Device, LibraryLoader, SampleKind};
