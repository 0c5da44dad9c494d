//! Backing store collaborator
//!
//! The engine needs exactly four capabilities from the configuration
//! store, independent of its wire protocol:
//! - key enumeration by table prefix
//! - batched (pipelined) hash reads
//! - existence checks
//! - a keyspace change notification subscription

mod errors;
mod fetch;
mod memory;
mod notification;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::translate::FieldMap;

pub use errors::{StoreError, StoreResult};
pub use fetch::{fetch_batched, fetch_table};
pub use memory::{MemoryStore, StoreStats};
pub use notification::{
    channel_matches, key_channel, table_channel, KeyspaceNotification, KeyspaceOp,
};

/// Receiving end of a notification subscription. Dropping it tears the
/// subscription down.
pub type NotificationReceiver = mpsc::UnboundedReceiver<KeyspaceNotification>;

/// Capabilities the engine requires from the configuration store
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Every key starting with `prefix`, sorted
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Fields of each key, in request order; `None` for absent keys
    async fn get_rows(&self, keys: &[String]) -> StoreResult<Vec<Option<FieldMap>>>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// One multiplexed subscription over all `channels` (glob patterns)
    async fn subscribe(&self, channels: &[String]) -> StoreResult<NotificationReceiver>;
}
