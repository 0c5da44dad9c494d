//! # In-Memory Store
//!
//! Process-local [`ConfigStore`] holding hashes keyed by full store key.
//! Writes publish keyspace notifications the way the production store
//! does, which makes it usable both as a test double and for offline
//! validation from the CLI.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::errors::{StoreError, StoreResult};
use super::notification::{channel_matches, KeyspaceNotification, KeyspaceOp};
use super::{ConfigStore, NotificationReceiver};
use crate::translate::FieldMap;

/// Subscriber registered through [`ConfigStore::subscribe`]
#[derive(Debug)]
struct Subscriber {
    patterns: Vec<String>,
    sender: mpsc::UnboundedSender<KeyspaceNotification>,
}

/// Access counters (passive only)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Prefix scans served
    pub key_scans: u64,
    /// Rows returned by batched reads (absent keys included)
    pub rows_fetched: u64,
    /// Batched read calls
    pub batches: u64,
    /// Existence checks served
    pub exists_checks: u64,
}

/// In-memory configuration store
#[derive(Debug)]
pub struct MemoryStore {
    db_index: u32,
    data: RwLock<BTreeMap<String, FieldMap>>,
    subscribers: Mutex<Vec<Subscriber>>,
    unavailable: AtomicBool,
    key_scans: AtomicU64,
    rows_fetched: AtomicU64,
    batches: AtomicU64,
    exists_checks: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(4)
    }
}

impl MemoryStore {
    /// Create an empty store publishing on DB index `db_index`
    pub fn new(db_index: u32) -> Self {
        Self {
            db_index,
            data: RwLock::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            key_scans: AtomicU64::new(0),
            rows_fetched: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            exists_checks: AtomicU64::new(0),
        }
    }

    /// Seeds rows without publishing notifications
    pub fn load(&self, rows: BTreeMap<String, FieldMap>) -> StoreResult<()> {
        let mut data = self.write_data()?;
        data.extend(rows);
        Ok(())
    }

    /// Seeds rows from `{"TABLE|key": {"field": "value"}}`
    pub fn load_json(&self, value: &Value) -> StoreResult<usize> {
        let object = value
            .as_object()
            .ok_or_else(|| StoreError::Malformed("seed data must be an object of keys".into()))?;

        let mut rows = BTreeMap::new();
        for (key, fields) in object {
            let fields = fields
                .as_object()
                .ok_or_else(|| StoreError::Malformed(format!("fields of '{}' must be an object", key)))?;
            let mut map = FieldMap::new();
            for (name, value) in fields {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Array(items) => items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                map.insert(name.clone(), text);
            }
            rows.insert(key.clone(), map);
        }

        let count = rows.len();
        self.load(rows)?;
        Ok(count)
    }

    /// Writes fields of `key` (creating it) and publishes `hset`
    pub fn hset(&self, key: &str, fields: FieldMap) -> StoreResult<()> {
        {
            let mut data = self.write_data()?;
            data.entry(key.to_string()).or_default().extend(fields);
        }
        self.publish(key, KeyspaceOp::FieldSet);
        Ok(())
    }

    /// Removes one field and publishes `hdel`; an emptied hash is removed
    /// and additionally publishes `del`
    pub fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let (removed, emptied) = {
            let mut data = self.write_data()?;
            match data.get_mut(key) {
                Some(fields) => {
                    let removed = fields.remove(field).is_some();
                    let emptied = fields.is_empty();
                    if emptied {
                        data.remove(key);
                    }
                    (removed, emptied)
                }
                None => (false, false),
            }
        };
        if removed {
            self.publish(key, KeyspaceOp::FieldDelete);
        }
        if emptied {
            self.publish(key, KeyspaceOp::KeyDelete);
        }
        Ok(removed)
    }

    /// Removes `key` and publishes `del`
    pub fn del(&self, key: &str) -> StoreResult<bool> {
        let removed = self.write_data()?.remove(key).is_some();
        if removed {
            self.publish(key, KeyspaceOp::KeyDelete);
        }
        Ok(removed)
    }

    /// Current fields of `key`
    pub fn get(&self, key: &str) -> Option<FieldMap> {
        self.data.read().ok().and_then(|data| data.get(key).cloned())
    }

    /// Makes every capability fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            key_scans: self.key_scans.load(Ordering::Relaxed),
            rows_fetched: self.rows_fetched.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            exists_checks: self.exists_checks.load(Ordering::Relaxed),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|mut subs| {
                subs.retain(|s| !s.sender.is_closed());
                subs.len()
            })
            .unwrap_or(0)
    }

    fn write_data(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, BTreeMap<String, FieldMap>>> {
        self.data
            .write()
            .map_err(|_| StoreError::Poisoned("data".into()))
    }

    fn read_data(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, FieldMap>>> {
        self.data
            .read()
            .map_err(|_| StoreError::Poisoned("data".into()))
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn publish(&self, key: &str, op: KeyspaceOp) {
        let notification = KeyspaceNotification::for_key(self.db_index, key, op);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            // Closed receivers are dropped here
            subscribers.retain(|sub| {
                if !sub.patterns.iter().any(|p| channel_matches(p, &notification.channel)) {
                    return !sub.sender.is_closed();
                }
                sub.sender.send(notification.clone()).is_ok()
            });
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check_available()?;
        self.key_scans.fetch_add(1, Ordering::Relaxed);
        let data = self.read_data()?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get_rows(&self, keys: &[String]) -> StoreResult<Vec<Option<FieldMap>>> {
        self.check_available()?;
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.rows_fetched.fetch_add(keys.len() as u64, Ordering::Relaxed);
        let data = self.read_data()?;
        Ok(keys.iter().map(|k| data.get(k).cloned()).collect())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check_available()?;
        self.exists_checks.fetch_add(1, Ordering::Relaxed);
        Ok(self.read_data()?.contains_key(key))
    }

    async fn subscribe(&self, channels: &[String]) -> StoreResult<NotificationReceiver> {
        self.check_available()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| StoreError::Poisoned("subscribers".into()))?;
        subscribers.push(Subscriber {
            patterns: channels.to_vec(),
            sender: tx,
        });
        Ok(rx)
    }
}
