//! Schema Index subsystem
//!
//! Schema description files are parsed once at startup into an immutable
//! [`SchemaIndex`] shared by every session.
//!
//! # Design Principles
//!
//! - Loaded once; a broken schema stops the process
//! - Immutable after load, shared behind an `Arc`
//! - Deterministic: same files always yield the same index

mod errors;
mod index;
mod loader;
mod types;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use index::{
    parse_leafref, KeySegment, LeafrefTarget, ReverseLeafrefIndex, SchemaIndex, TableSchema,
    DEFAULT_KEY_DELIMITER, LEAF_LIST_SUFFIX,
};
pub use loader::SchemaLoader;
pub use types::{FieldDef, FieldType, MustDef, SchemaModule, TableDef};
