//! Structural and semantic processor
//!
//! The engine assembles the validation subject and its dependent data;
//! judging them against the schema is delegated to a [`SchemaProcessor`].
//! Deployments with a full YANG engine plug it in here. The crate ships
//! [`BuiltinProcessor`], which covers types, ranges, patterns, mandatory
//! fields and leafref resolution.

mod builtin;

pub use builtin::BuiltinProcessor;

use crate::document::Document;
use crate::errors::CvlResult;
use crate::session::Operation;

/// Judges a subject document against the schema
pub trait SchemaProcessor: Send + Sync {
    /// Validates `subject` for `op`. `dependent` holds the related rows
    /// the subject may reference or be constrained by.
    ///
    /// The first violation found is returned with table, key and field
    /// context.
    fn validate(&self, subject: &Document, dependent: Option<&Document>, op: Operation) -> CvlResult<()>;
}
