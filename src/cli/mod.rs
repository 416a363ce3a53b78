//! Command-line interface for bench-forge.
//!
//! Provides commands for running evaluations, executing single programs in
//! the sandbox and inspecting the category table.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
