//! CLI command implementations
//!
//! Both commands follow the same boot sequence:
//! 1. load and validate the config file
//! 2. initialise logging from the config
//! 3. load the schema directory (fatal on any error)

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::observability::{init_logging, log_event_with_fields, Event};
use crate::schema::SchemaLoader;
use crate::session::{EditItem, Engine};
use crate::store::MemoryStore;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_requests, validation_response, write_error, write_response};

/// Main CLI entry point
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::CheckSchema { config } => check_schema(&config),
        Command::Validate { config, data } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| CliError::boot_failed(format!("Failed to start runtime: {}", e)))?;
            runtime.block_on(validate(&config, data.as_deref()))
        }
    }
}

fn boot_config(config_path: &Path) -> CliResult<EngineConfig> {
    let config = EngineConfig::load(config_path)?;
    // A subscriber installed by the embedding process wins
    let _ = init_logging(&config.log_level, &config.log_format);

    let path = config_path.display().to_string();
    log_event_with_fields(Event::ConfigLoaded, &[("path", path.as_str())]);
    Ok(config)
}

/// Load the schema and print one summary line per table
pub fn check_schema(config_path: &Path) -> CliResult<()> {
    let config = boot_config(config_path)?;
    let index = SchemaLoader::load(&config.schema_dir, &config.key_delimiter)
        .map_err(|e| CliError::boot_failed(e.to_string()))?;

    let mut tables = Vec::with_capacity(index.table_count());
    for table in index.tables() {
        tables.push(serde_json::json!({
            "table": table.name,
            "module": table.module,
            "keys": table.key_names().collect::<Vec<_>>(),
            "fields": table.fields.len(),
            "leafrefs": table.leafref_targets.len(),
            "must": table.must.len(),
            "dependent_tables": table.dependent_tables,
            "max_elements": table.max_elements,
        }));
    }
    write_response(&serde_json::json!({"status": "ok", "tables": tables}))
}

/// Validate edit batches read from stdin within a single session
pub async fn validate(config_path: &Path, data: Option<&Path>) -> CliResult<()> {
    let config = boot_config(config_path)?;

    let store = Arc::new(MemoryStore::new(config.db_index));
    if let Some(path) = data {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::data_error(format!("Failed to read '{}': {}", path.display(), e)))?;
        let rows: Value = serde_json::from_str(&content)
            .map_err(|e| CliError::data_error(format!("Invalid JSON in '{}': {}", path.display(), e)))?;
        store
            .load_json(&rows)
            .map_err(|e| CliError::data_error(e.to_string()))?;
    }

    let engine = Engine::new(config, store).await?;
    let mut session = engine.open_session();

    for request in read_requests() {
        match request {
            Ok(value) => {
                let edits: Vec<EditItem> = match serde_json::from_value(value) {
                    Ok(edits) => edits,
                    Err(e) => {
                        let err = CliError::invalid_request(e.to_string());
                        write_error(err.code_str(), err.message())?;
                        continue;
                    }
                };
                let response = validation_response(session.validate(&edits).await);
                write_response(&response)?;
            }
            Err(e) => {
                // Unreadable stdin ends the loop
                write_error(e.code_str(), e.message())?;
                break;
            }
        }
    }

    session.close();
    engine.shutdown().await;
    Ok(())
}
