//! Validation error taxonomy
//!
//! Every rejection handed back to a caller is a [`CvlError`]: a stable
//! return code plus an [`ErrorInfo`] carrying enough structured context
//! (table, key, field, constraint) to be rendered as a protocol error
//! without parsing free text.
//!
//! Error codes:
//! - CVL_SUCCESS (accepted; never carried by a `CvlError`)
//! - CVL_SYNTAX_* (REJECT, structural violations)
//! - CVL_SEMANTIC_* (REJECT, relational violations)
//! - CVL_SCHEMA_LOAD_ERROR (FATAL)
//! - CVL_STORE_ERROR (REJECT, current step failed)
//! - CVL_INTERNAL_UNKNOWN (REJECT, shape assumption violated)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::SchemaError;
use crate::store::StoreError;

/// Broad family an error code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Success,
    Syntax,
    Semantic,
    Schema,
    Store,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Success => "SUCCESS",
            ErrorCategory::Syntax => "SYNTAX",
            ErrorCategory::Semantic => "SEMANTIC",
            ErrorCategory::Schema => "SCHEMA",
            ErrorCategory::Store => "STORE",
            ErrorCategory::Internal => "INTERNAL",
        };
        write!(f, "{}", name)
    }
}

/// Return codes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CvlErrorCode {
    /// Edits accepted
    Success,
    /// Field required by the request is missing
    SyntaxMissingField,
    /// Field is not declared by the table schema
    SyntaxInvalidField,
    /// Value is not of the declared type
    SyntaxInvalidInputData,
    /// Non leaf-list field supplied more than once
    SyntaxDuplicate,
    /// Value is not one of the declared enum values
    SyntaxEnumInvalid,
    /// Value is outside the declared range
    SyntaxOutOfRange,
    /// Value does not match the declared pattern
    SyntaxPatternInvalid,
    /// Table would exceed its max-elements ceiling
    SyntaxMaximumInvalid,
    /// Referenced (leafref) data does not exist
    SemanticDependentDataMissing,
    /// Mandatory field absent on create
    SemanticMandatoryDataMissing,
    /// Create of a key that already exists
    SemanticKeyAlreadyExist,
    /// Update or delete of a key that does not exist
    SemanticKeyNotExist,
    /// Same key staged twice in one request
    SemanticKeyDuplicate,
    /// Key does not fit the table's key pattern
    SemanticKeyInvalid,
    /// Delete would leave a dangling leafref
    SemanticLeafrefIntegrity,
    /// Schema could not be loaded
    SchemaLoadError,
    /// Backing store failed the current step
    StoreError,
    /// Unexpected shape while translating or merging
    InternalUnknown,
}

impl CvlErrorCode {
    /// Returns the wire code string
    pub fn code(&self) -> &'static str {
        match self {
            CvlErrorCode::Success => "CVL_SUCCESS",
            CvlErrorCode::SyntaxMissingField => "CVL_SYNTAX_MISSING_FIELD",
            CvlErrorCode::SyntaxInvalidField => "CVL_SYNTAX_INVALID_FIELD",
            CvlErrorCode::SyntaxInvalidInputData => "CVL_SYNTAX_INVALID_INPUT_DATA",
            CvlErrorCode::SyntaxDuplicate => "CVL_SYNTAX_DUPLICATE",
            CvlErrorCode::SyntaxEnumInvalid => "CVL_SYNTAX_ENUM_INVALID",
            CvlErrorCode::SyntaxOutOfRange => "CVL_SYNTAX_OUT_OF_RANGE",
            CvlErrorCode::SyntaxPatternInvalid => "CVL_SYNTAX_PATTERN_INVALID",
            CvlErrorCode::SyntaxMaximumInvalid => "CVL_SYNTAX_MAXIMUM_INVALID",
            CvlErrorCode::SemanticDependentDataMissing => "CVL_SEMANTIC_DEPENDENT_DATA_MISSING",
            CvlErrorCode::SemanticMandatoryDataMissing => "CVL_SEMANTIC_MANDATORY_DATA_MISSING",
            CvlErrorCode::SemanticKeyAlreadyExist => "CVL_SEMANTIC_KEY_ALREADY_EXIST",
            CvlErrorCode::SemanticKeyNotExist => "CVL_SEMANTIC_KEY_NOT_EXIST",
            CvlErrorCode::SemanticKeyDuplicate => "CVL_SEMANTIC_KEY_DUPLICATE",
            CvlErrorCode::SemanticKeyInvalid => "CVL_SEMANTIC_KEY_INVALID",
            CvlErrorCode::SemanticLeafrefIntegrity => "CVL_SEMANTIC_ERROR",
            CvlErrorCode::SchemaLoadError => "CVL_SCHEMA_LOAD_ERROR",
            CvlErrorCode::StoreError => "CVL_STORE_ERROR",
            CvlErrorCode::InternalUnknown => "CVL_INTERNAL_UNKNOWN",
        }
    }

    /// Returns the family this code belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            CvlErrorCode::Success => ErrorCategory::Success,
            CvlErrorCode::SyntaxMissingField
            | CvlErrorCode::SyntaxInvalidField
            | CvlErrorCode::SyntaxInvalidInputData
            | CvlErrorCode::SyntaxDuplicate
            | CvlErrorCode::SyntaxEnumInvalid
            | CvlErrorCode::SyntaxOutOfRange
            | CvlErrorCode::SyntaxPatternInvalid
            | CvlErrorCode::SyntaxMaximumInvalid => ErrorCategory::Syntax,
            CvlErrorCode::SemanticDependentDataMissing
            | CvlErrorCode::SemanticMandatoryDataMissing
            | CvlErrorCode::SemanticKeyAlreadyExist
            | CvlErrorCode::SemanticKeyNotExist
            | CvlErrorCode::SemanticKeyDuplicate
            | CvlErrorCode::SemanticKeyInvalid
            | CvlErrorCode::SemanticLeafrefIntegrity => ErrorCategory::Semantic,
            CvlErrorCode::SchemaLoadError => ErrorCategory::Schema,
            CvlErrorCode::StoreError => ErrorCategory::Store,
            CvlErrorCode::InternalUnknown => ErrorCategory::Internal,
        }
    }

    /// Returns whether the process cannot keep serving after this error
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Schema
    }

    /// Return code of a finished call
    pub fn of<T>(result: &CvlResult<T>) -> Self {
        match result {
            Ok(_) => CvlErrorCode::Success,
            Err(e) => e.code,
        }
    }
}

impl fmt::Display for CvlErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Structured context attached to every error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Offending table
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub table: String,
    /// Key components of the offending row
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_components: Vec<String>,
    /// Offending field
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    /// Offending value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Human-readable message
    pub message: String,
    /// Schema-declared constraint message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub constraint_message: String,
    /// Schema-declared application error tag
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_app_tag: String,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Validation error with full context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvlError {
    code: CvlErrorCode,
    info: ErrorInfo,
}

impl CvlError {
    /// Create an error with only a message
    pub fn new(code: CvlErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            info: ErrorInfo::new(message),
        }
    }

    /// Create an error from prepared context
    pub fn with_info(code: CvlErrorCode, info: ErrorInfo) -> Self {
        Self { code, info }
    }

    /// Attach the table and key the error concerns
    pub fn at(mut self, table: impl Into<String>, key_components: Vec<String>) -> Self {
        self.info.table = table.into();
        self.info.key_components = key_components;
        self
    }

    /// Attach the offending field and value
    pub fn field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.field = field.into();
        self.info.value = value.into();
        self
    }

    /// Attach schema-declared constraint text
    pub fn constraint(mut self, message: Option<&str>, app_tag: Option<&str>) -> Self {
        if let Some(message) = message {
            self.info.constraint_message = message.to_string();
        }
        if let Some(tag) = app_tag {
            self.info.error_app_tag = tag.to_string();
        }
        self
    }

    pub fn key_already_exists(table: &str, key_components: Vec<String>) -> Self {
        Self::new(
            CvlErrorCode::SemanticKeyAlreadyExist,
            format!("Key already exists in table '{}'", table),
        )
        .at(table, key_components)
    }

    pub fn key_not_found(table: &str, key_components: Vec<String>) -> Self {
        Self::new(
            CvlErrorCode::SemanticKeyNotExist,
            format!("Key does not exist in table '{}'", table),
        )
        .at(table, key_components)
    }

    pub fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut err = Self::new(
            CvlErrorCode::SemanticKeyInvalid,
            format!("Invalid key '{}': {}", key, reason),
        );
        err.info.value = key.to_string();
        err
    }

    pub fn max_elements(table: &str, limit: usize) -> Self {
        Self::new(
            CvlErrorCode::SyntaxMaximumInvalid,
            format!("Table '{}' cannot hold more than {} entries", table, limit),
        )
        .at(table, Vec::new())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CvlErrorCode::InternalUnknown, message)
    }

    /// Returns the error code
    pub fn code(&self) -> CvlErrorCode {
        self.code
    }

    /// Returns the structured context
    pub fn info(&self) -> &ErrorInfo {
        &self.info
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.info.message
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }

    /// Splits into the `(ErrorInfo, RetCode)` pair callers put on the wire
    pub fn into_parts(self) -> (ErrorInfo, CvlErrorCode) {
        (self.info, self.code)
    }
}

impl fmt::Display for CvlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.category(), self.code.code(), self.info.message)?;
        if !self.info.table.is_empty() {
            write!(f, " (table '{}'", self.info.table)?;
            if !self.info.key_components.is_empty() {
                write!(f, ", key '{}'", self.info.key_components.join("|"))?;
            }
            if !self.info.field.is_empty() {
                write!(f, ", field '{}'", self.info.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for CvlError {}

impl From<StoreError> for CvlError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::Poisoned(_) => CvlErrorCode::InternalUnknown,
            _ => CvlErrorCode::StoreError,
        };
        CvlError::new(code, err.to_string())
    }
}

impl From<SchemaError> for CvlError {
    fn from(err: SchemaError) -> Self {
        CvlError::new(CvlErrorCode::SchemaLoadError, err.message().to_string())
    }
}

/// Result type for validation operations
pub type CvlResult<T> = Result<T, CvlError>;
