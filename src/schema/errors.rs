//! Schema load error types
//!
//! Error codes:
//! - CVL_SCHEMA_UNREADABLE (FATAL)
//! - CVL_SCHEMA_MALFORMED (FATAL)
//! - CVL_SCHEMA_DUPLICATE_TABLE (FATAL)
//! - CVL_SCHEMA_INVALID_KEY_PATTERN (FATAL)
//! - CVL_SCHEMA_INVALID_LEAFREF (FATAL)
//! - CVL_SCHEMA_INVALID_FIELD (FATAL)
//!
//! A broken schema means no validation can be served, so every schema
//! error is fatal to the process.

use std::fmt;

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Schema directory or file could not be read
    CvlSchemaUnreadable,
    /// Schema file is not a valid description document
    CvlSchemaMalformed,
    /// Two modules declare the same table
    CvlSchemaDuplicateTable,
    /// Key pattern does not describe the table keys
    CvlSchemaInvalidKeyPattern,
    /// Leafref path cannot be resolved to a table and leaf
    CvlSchemaInvalidLeafref,
    /// Field declaration is inconsistent
    CvlSchemaInvalidField,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::CvlSchemaUnreadable => "CVL_SCHEMA_UNREADABLE",
            SchemaErrorCode::CvlSchemaMalformed => "CVL_SCHEMA_MALFORMED",
            SchemaErrorCode::CvlSchemaDuplicateTable => "CVL_SCHEMA_DUPLICATE_TABLE",
            SchemaErrorCode::CvlSchemaInvalidKeyPattern => "CVL_SCHEMA_INVALID_KEY_PATTERN",
            SchemaErrorCode::CvlSchemaInvalidLeafref => "CVL_SCHEMA_INVALID_LEAFREF",
            SchemaErrorCode::CvlSchemaInvalidField => "CVL_SCHEMA_INVALID_FIELD",
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error type with full context
#[derive(Debug)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    /// Source file if applicable
    path: Option<String>,
    /// Table if applicable
    table: Option<String>,
}

impl SchemaError {
    /// Create an error for an unreadable directory or file
    pub fn unreadable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code: SchemaErrorCode::CvlSchemaUnreadable,
            message: format!("Cannot read schema source '{}': {}", path, reason.into()),
            path: Some(path),
            table: None,
        }
    }

    /// Create an error for a malformed schema file
    pub fn malformed_schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code: SchemaErrorCode::CvlSchemaMalformed,
            message: format!("Malformed schema file '{}': {}", path, reason.into()),
            path: Some(path),
            table: None,
        }
    }

    /// Create a duplicate table error
    pub fn duplicate_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            code: SchemaErrorCode::CvlSchemaDuplicateTable,
            message: format!("Table '{}' is declared more than once", table),
            path: None,
            table: Some(table),
        }
    }

    /// Create an invalid key pattern error
    pub fn invalid_key_pattern(table: impl Into<String>, reason: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            code: SchemaErrorCode::CvlSchemaInvalidKeyPattern,
            message: format!("Table '{}' has an invalid key pattern: {}", table, reason.into()),
            path: None,
            table: Some(table),
        }
    }

    /// Create an invalid leafref error
    pub fn invalid_leafref(table: impl Into<String>, field: &str, path: &str) -> Self {
        let table = table.into();
        Self {
            code: SchemaErrorCode::CvlSchemaInvalidLeafref,
            message: format!(
                "Table '{}' field '{}' has an unresolvable leafref path '{}'",
                table, field, path
            ),
            path: None,
            table: Some(table),
        }
    }

    /// Create an invalid field error
    pub fn invalid_field(table: impl Into<String>, reason: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            code: SchemaErrorCode::CvlSchemaInvalidField,
            message: format!("Table '{}': {}", table, reason.into()),
            path: None,
            table: Some(table),
        }
    }

    /// Attach the schema file the error came from
    pub fn in_file(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the source file if applicable
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns the table if applicable
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Schema errors always stop the process
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[FATAL] {}: {}", self.code.code(), self.message)?;
        if let Some(path) = &self.path {
            write!(f, " [in {}]", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
