//! Schema loader for reading schema description files at startup
//!
//! - One `*.json` description file per YANG module
//! - Files are read in name order so the index is identical across restarts
//! - Any unreadable or malformed file aborts startup (FATAL)

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{SchemaError, SchemaResult};
use super::index::SchemaIndex;
use super::types::SchemaModule;

/// Reads schema description files and builds the [`SchemaIndex`].
pub struct SchemaLoader {
    /// Directory containing schema files
    schema_dir: PathBuf,
    /// Modules read so far
    modules: Vec<SchemaModule>,
}

impl SchemaLoader {
    /// Creates a loader for the given schema directory.
    pub fn new(schema_dir: &Path) -> Self {
        Self {
            schema_dir: schema_dir.to_path_buf(),
            modules: Vec::new(),
        }
    }

    /// Returns the schema directory path.
    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    /// Loads every schema file from the schema directory.
    pub fn load_all(&mut self) -> SchemaResult<()> {
        let dir = self.schema_dir.display().to_string();
        let entries = fs::read_dir(&self.schema_dir)
            .map_err(|e| SchemaError::unreadable(&dir, format!("Failed to read schema directory: {}", e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| SchemaError::unreadable(&dir, format!("Failed to read directory entry: {}", e)))?;
            let path = entry.path();

            // Skip non-JSON files
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        for path in paths {
            self.load_schema_file(&path)?;
        }

        Ok(())
    }

    /// Loads a single schema file.
    fn load_schema_file(&mut self, path: &Path) -> SchemaResult<()> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::unreadable(path.display().to_string(), format!("Failed to read file: {}", e))
        })?;

        let module: SchemaModule = serde_json::from_str(&content).map_err(|e| {
            SchemaError::malformed_schema(path.display().to_string(), format!("Invalid JSON: {}", e))
        })?;

        if module.module.is_empty() {
            return Err(SchemaError::malformed_schema(
                path.display().to_string(),
                "module name is empty",
            ));
        }

        self.modules.push(module);
        Ok(())
    }

    /// Registers a module directly (for testing or programmatic creation).
    pub fn register(&mut self, module: SchemaModule) {
        self.modules.push(module);
    }

    /// Returns the number of modules read.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Builds the immutable index from everything loaded.
    pub fn into_index(self, default_delimiter: &str) -> SchemaResult<SchemaIndex> {
        let dir = self.schema_dir.display().to_string();
        SchemaIndex::build_with_delimiter(self.modules, default_delimiter)
            .map_err(|e| e.in_file(dir))
    }

    /// Convenience: read `schema_dir` and build the index in one step.
    pub fn load(schema_dir: &Path, default_delimiter: &str) -> SchemaResult<SchemaIndex> {
        let mut loader = Self::new(schema_dir);
        loader.load_all()?;
        loader.into_index(default_delimiter)
    }
}
