//! Command-line front end
//!
//! Argument definitions (clap derive) and table/JSON/compact rendering.

pub mod args;
pub mod output;

pub use args::{Cli, Commands, OutputFormat};
pub use output::{print_output, TableDisplay};
