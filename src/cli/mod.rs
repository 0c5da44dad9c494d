//! CLI module for cvl
//!
//! Provides command-line interface for:
//! - check-schema: load the schema directory and summarise its tables
//! - validate: run edit batches from stdin through one session

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_schema, run, run_command, validate};
pub use errors::{CliError, CliErrorCode, CliResult};
