//! CLI argument definitions using clap
//!
//! Commands:
//! - cvl check-schema --config <path>
//! - cvl validate --config <path> [--data <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cvl - configuration validation against YANG-derived schema
#[derive(Parser, Debug)]
#[command(name = "cvl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the schema directory and print a table summary
    CheckSchema {
        /// Path to configuration file
        #[arg(long, default_value = "./cvl.json")]
        config: PathBuf,
    },

    /// Validate edit batches read from stdin, one JSON array per line
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./cvl.json")]
        config: PathBuf,

        /// JSON object of store rows (`"TABLE|key": {field: value}`)
        /// seeding the in-memory store
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_defaults() {
        let cli = Cli::try_parse_from(["cvl", "validate"]).unwrap();
        match cli.command {
            Command::Validate { config, data } => {
                assert_eq!(config, PathBuf::from("./cvl.json"));
                assert!(data.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_check_schema_config() {
        let cli = Cli::try_parse_from(["cvl", "check-schema", "--config", "/etc/cvl.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::CheckSchema { config } if config == PathBuf::from("/etc/cvl.json")
        ));
    }
}
