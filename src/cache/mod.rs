//! # Global Cache
//!
//! Process-wide read cache of whole tables, shared by every session.
//!
//! - A table is registered with [`GlobalCache::set`] and built eagerly:
//!   key enumeration, bulk fetch, translation into one [`Document`]
//! - Reads within the expiry window hand out an `Arc<Document>`; callers
//!   traverse it without holding the cache lock
//! - A background listener keeps one store subscription covering every
//!   registered table and applies changes one key at a time
//! - All mutations (population, invalidation, notification updates, folds)
//!   go through one async mutex
//!
//! The cache is a derived view of the store and can be dropped and rebuilt
//! at any time.

mod listener;
mod stats;

pub use stats::CacheStats;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::document::Document;
use crate::errors::{CvlError, CvlErrorCode, CvlResult};
use crate::observability::{log_event_with_fields, Event};
use crate::resolver::{overlay_row, remove_row};
use crate::schema::{SchemaIndex, TableSchema};
use crate::session::{Operation, StagedState};
use crate::store::{fetch_table, table_channel, ConfigStore, KeyspaceNotification, KeyspaceOp};
use crate::translate::{translate, translate_row, TableRows};

use listener::ListenerCommand;

/// One cached table
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// `None` after invalidation until the next read rebuilds it
    doc: Option<Arc<Document>>,
    created_at: DateTime<Utc>,
    /// 0 means never expire
    expiry_secs: u64,
}

impl CacheEntry {
    fn new(doc: Document, expiry_secs: u64) -> Self {
        Self {
            doc: Some(Arc::new(doc)),
            created_at: Utc::now(),
            expiry_secs,
        }
    }

    /// Registered but not built yet
    fn pending(expiry_secs: u64) -> Self {
        Self {
            doc: None,
            created_at: Utc::now(),
            expiry_secs,
        }
    }

    pub fn document(&self) -> Option<&Arc<Document>> {
        self.doc.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expiry_secs(&self) -> u64 {
        self.expiry_secs
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_secs > 0
            && now.signed_duration_since(self.created_at).num_seconds() >= self.expiry_secs as i64
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<String, CacheEntry>,
    stats: CacheStats,
}

struct CacheInner {
    schema: Arc<SchemaIndex>,
    store: Arc<dyn ConfigStore>,
    db_index: u32,
    batch_size: usize,
    state: Mutex<CacheState>,
    commands: mpsc::UnboundedSender<ListenerCommand>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

/// Shared handle to the process-wide cache
#[derive(Clone)]
pub struct GlobalCache {
    inner: Arc<CacheInner>,
}

impl GlobalCache {
    /// Creates an empty cache and starts its listener task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(schema: Arc<SchemaIndex>, store: Arc<dyn ConfigStore>, db_index: u32, batch_size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(CacheInner {
            schema,
            store: Arc::clone(&store),
            db_index,
            batch_size: batch_size.max(1),
            state: Mutex::new(CacheState::default()),
            commands: tx,
            listener: StdMutex::new(None),
        });

        let handle = tokio::spawn(listener::run(Arc::downgrade(&inner), store, rx));
        if let Ok(mut slot) = inner.listener.lock() {
            *slot = Some(handle);
        }

        Self { inner }
    }

    /// Registers `table`, extends the subscription to cover it and then
    /// builds it.
    ///
    /// The build starts only after the listener confirms the new
    /// subscription, so no write to the table can fall between the two.
    pub async fn set(&self, table: &str, expiry_secs: u64) -> CvlResult<()> {
        let inner = &self.inner;
        inner.table_schema(table)?;

        let channels = {
            let mut state = inner.state.lock().await;
            state.entries.insert(table.to_string(), CacheEntry::pending(expiry_secs));
            inner.channels(&state)
        };
        inner.resubscribe_confirmed(channels).await;

        let mut guard = inner.state.lock().await;
        let state = &mut *guard;
        match inner.build(table).await {
            Ok(doc) => {
                state.entries.insert(table.to_string(), CacheEntry::new(doc, expiry_secs));
                state.stats.builds += 1;
                Ok(())
            }
            Err(e) => {
                state.entries.remove(table);
                let channels = inner.channels(state);
                drop(guard);
                inner.resubscribe(channels);
                Err(e)
            }
        }
    }

    /// Unregisters `table`; returns whether it was cached.
    pub async fn remove(&self, table: &str) -> bool {
        let inner = &self.inner;
        let (removed, channels) = {
            let mut state = inner.state.lock().await;
            let removed = state.entries.remove(table).is_some();
            (removed, inner.channels(&state))
        };
        if removed {
            inner.resubscribe(channels);
        }
        removed
    }

    /// Cached document of `table`, rebuilt first when expired or
    /// invalidated. `None` when the table is not registered.
    pub async fn get(&self, table: &str) -> CvlResult<Option<Arc<Document>>> {
        let inner = &self.inner;
        let mut guard = inner.state.lock().await;
        let state = &mut *guard;

        let Some(entry) = state.entries.get(table) else {
            return Ok(None);
        };
        if !entry.is_expired(Utc::now()) {
            if let Some(doc) = &entry.doc {
                state.stats.hits += 1;
                debug!(table, "cache hit");
                return Ok(Some(Arc::clone(doc)));
            }
        }

        let expiry_secs = entry.expiry_secs;
        state.stats.misses += 1;
        log_event_with_fields(Event::CacheMiss, &[("table", table)]);

        let doc = inner.build(table).await?;
        let entry = CacheEntry::new(doc, expiry_secs);
        let doc = entry.doc.clone();
        state.entries.insert(table.to_string(), entry);
        state.stats.builds += 1;
        Ok(doc)
    }

    /// Drops the cached document of `table`; the next read rebuilds it.
    pub async fn invalidate(&self, table: &str) -> bool {
        self.inner.invalidate(table).await
    }

    /// Applies one keyspace notification. Returns `false` when it does not
    /// concern a built cached table.
    pub async fn apply_notification(&self, notification: &KeyspaceNotification) -> CvlResult<bool> {
        self.inner.apply_notification(notification).await
    }

    /// Folds validated rows into the cached tables among them.
    pub async fn fold(&self, rows: &TableRows, op: Operation) -> CvlResult<()> {
        if op == Operation::None {
            return Ok(());
        }

        let inner = &self.inner;
        let mut guard = inner.state.lock().await;
        let state = &mut *guard;

        for (table_name, table_rows) in rows {
            let Some(doc) = state.entries.get_mut(table_name).and_then(|e| e.doc.as_mut()) else {
                continue;
            };
            let table = inner.table_schema(table_name)?;
            let target = Arc::make_mut(doc);
            for (row_key, fields) in table_rows {
                let staged = StagedState::from_edit(op, fields);
                overlay_row(&inner.schema, table, target, row_key, &staged)?;
            }
            target.compact_if_sparse();
            state.stats.folds += 1;
        }
        Ok(())
    }

    /// Registered tables, sorted
    pub async fn tables(&self) -> Vec<String> {
        self.inner.state.lock().await.entries.keys().cloned().collect()
    }

    /// Snapshot of one registered entry
    pub async fn entry(&self, table: &str) -> Option<CacheEntry> {
        self.inner.state.lock().await.entries.get(table).cloned()
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.state.lock().await.stats.clone()
    }

    /// Stops the listener task and waits for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.inner.commands.send(ListenerCommand::Shutdown);
        let handle = self.inner.listener.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "cache listener ended abnormally");
            }
        }
    }
}

impl CacheInner {
    fn table_schema(&self, table: &str) -> CvlResult<&TableSchema> {
        self.schema.table(table).ok_or_else(|| {
            CvlError::new(CvlErrorCode::SemanticKeyInvalid, format!("Unknown table '{}'", table))
                .at(table, Vec::new())
        })
    }

    /// Full build of one table from the store
    async fn build(&self, table: &str) -> CvlResult<Document> {
        let schema = self.table_schema(table)?;
        let rows = fetch_table(self.store.as_ref(), schema, self.batch_size).await?;
        let count = rows.len().to_string();

        let mut all = TableRows::new();
        all.insert(table.to_string(), rows);
        let doc = translate(&self.schema, &all)?;

        log_event_with_fields(Event::CacheBuild, &[("rows", count.as_str()), ("table", table)]);
        Ok(doc)
    }

    fn channels(&self, state: &CacheState) -> Vec<String> {
        state
            .entries
            .keys()
            .filter_map(|name| self.schema.table(name))
            .map(|t| table_channel(self.db_index, &t.name, &t.key_delimiter))
            .collect()
    }

    fn resubscribe(&self, channels: Vec<String>) {
        let command = ListenerCommand::Resubscribe { channels, done: None };
        if self.commands.send(command).is_err() {
            warn!("cache listener is not running; notifications will not be applied");
        }
    }

    /// Like [`resubscribe`](Self::resubscribe), but waits until the listener
    /// has acted on the command.
    async fn resubscribe_confirmed(&self, channels: Vec<String>) {
        let (done, confirmed) = oneshot::channel();
        let command = ListenerCommand::Resubscribe { channels, done: Some(done) };
        if self.commands.send(command).is_err() {
            warn!("cache listener is not running; notifications will not be applied");
            return;
        }
        if confirmed.await.is_err() {
            warn!("cache listener stopped before confirming the subscription");
        }
    }

    async fn invalidate(&self, table: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.get_mut(table) else {
            return false;
        };
        entry.doc = None;
        state.stats.invalidations += 1;
        log_event_with_fields(Event::CacheInvalidate, &[("table", table)]);
        true
    }

    async fn invalidate_key(&self, key: &str) {
        if let Some((table, _)) = self.schema.split_store_key(key) {
            self.invalidate(&table.name).await;
        }
    }

    async fn apply_notification(&self, notification: &KeyspaceNotification) -> CvlResult<bool> {
        let (Some(key), Some(op)) = (notification.key(), notification.op()) else {
            return Ok(false);
        };
        let Some((table, row_key)) = self.schema.split_store_key(key) else {
            return Ok(false);
        };

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let Some(doc) = state.entries.get_mut(&table.name).and_then(|e| e.doc.as_mut()) else {
            return Ok(false);
        };

        let current = match op {
            KeyspaceOp::KeyDelete => None,
            KeyspaceOp::FieldSet | KeyspaceOp::FieldDelete => {
                self.store.get_rows(&[key.to_string()]).await?.into_iter().next().flatten()
            }
        };

        let target = Arc::make_mut(doc);
        remove_row(table, target, row_key)?;
        if let Some(fields) = current {
            target.merge_from(translate_row(&self.schema, &table.name, row_key, &fields)?);
        }
        target.compact_if_sparse();
        state.stats.incremental_updates += 1;

        log_event_with_fields(
            Event::NotificationApplied,
            &[("key", key), ("op", op.as_str()), ("table", table.name.as_str())],
        );
        Ok(true)
    }
}
