//! Command-line interface for dataset-cleaner.
//!
//! Provides the `clean` command that runs a dataset through the cleaning
//! engine and the `view` command for inspecting checkpoints.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
