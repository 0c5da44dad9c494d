//! # Store Errors
//!
//! Failures reported by the backing store collaborator. Any of these fails
//! the current resolve/validate step; the engine never retries.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Backing store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Store could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Keyspace notification subscription failed
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// Stored data has an unexpected shape
    #[error("Malformed store data: {0}")]
    Malformed(String),

    /// A lock guarding store state was poisoned by a panicking holder
    #[error("Store lock poisoned: {0}")]
    Poisoned(String),
}

impl StoreError {
    /// Returns a stable code for logging
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "CVL_STORE_UNAVAILABLE",
            StoreError::Subscription(_) => "CVL_STORE_SUBSCRIPTION",
            StoreError::Malformed(_) => "CVL_STORE_MALFORMED",
            StoreError::Poisoned(_) => "CVL_STORE_POISONED",
        }
    }
}
