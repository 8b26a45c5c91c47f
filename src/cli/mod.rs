//! Command-line interface for prompt-forge.
//!
//! Provides the `evaluate` and `optimize` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
