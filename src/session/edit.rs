//! Edit items submitted to a validation session

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::translate::FieldMap;

/// Operation requested for one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Context only; the row is neither created nor changed
    None,
}

impl Operation {
    /// Tag handed to the schema processor
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::None => "none",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_validate_now() -> bool {
    true
}

/// One keyed edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditItem {
    /// `false` supplies the row as dependent context only
    #[serde(default = "default_validate_now")]
    pub validate_now: bool,
    pub operation: Operation,
    /// Full store key, `TABLE|k1|k2`
    pub key: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl EditItem {
    pub fn new(operation: Operation, key: impl Into<String>) -> Self {
        Self {
            validate_now: true,
            operation,
            key: key.into(),
            fields: FieldMap::new(),
        }
    }

    pub fn create(key: impl Into<String>) -> Self {
        Self::new(Operation::Create, key)
    }

    pub fn update(key: impl Into<String>) -> Self {
        Self::new(Operation::Update, key)
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(Operation::Delete, key)
    }

    /// Adds one field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Marks the edit as dependent context only
    pub fn dependent_only(mut self) -> Self {
        self.validate_now = false;
        self
    }
}
