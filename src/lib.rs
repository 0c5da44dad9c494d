//! cvl - configuration validation for a key/value-backed, YANG-modelled
//! configuration store
//!
//! Edits are staged in a [`session::ValidationSession`], checked against
//! the schema loaded at startup and the data already in the store, and
//! either accepted as a whole or rejected with the first violation found.

pub mod cache;
pub mod cli;
pub mod config;
pub mod document;
pub mod errors;
pub mod merge;
pub mod observability;
pub mod processor;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod store;
pub mod translate;

pub use config::EngineConfig;
pub use errors::{CvlError, CvlErrorCode, CvlResult, ErrorInfo};
pub use session::{EditItem, Engine, Operation, ValidationSession};
