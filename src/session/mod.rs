//! # Validation Session
//!
//! One session per caller. Edits submitted through
//! [`ValidationSession::validate`] are checked in four steps:
//! 1. key existence, against staged edits first and the store second
//! 2. leafref delete integrity for whole-row deletes
//! 3. max-elements, with a running per-table count
//! 4. the schema processor, over the subject document and the dependent
//!    document assembled by the resolver
//!
//! Accepted edits stay visible to later calls through the request cache
//! and are folded into the global cache. A rejected call leaves the
//! session as it was before the call. Nothing is ever written to the store.
//!
//! Lifecycle: `Open -> Staging -> Closed`.

mod edit;
mod engine;
mod integrity;
mod request_cache;

pub use edit::{EditItem, Operation};
pub use engine::Engine;
pub use request_cache::{is_whole_row, FieldPatch, RequestCache, StagedEdit, StagedState};

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::cache::GlobalCache;
use crate::document::Document;
use crate::errors::{CvlError, CvlResult};
use crate::observability::{log_event_with_fields, Event};
use crate::processor::SchemaProcessor;
use crate::resolver::{overlay_row, DependencyResolver};
use crate::schema::{SchemaIndex, TableSchema};
use crate::store::ConfigStore;
use crate::translate::{expand_key, translate, TableRows};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No edit accepted yet
    Open,
    /// At least one validate call made
    Staging,
    Closed,
}

/// An edit with its key resolved against the schema
struct KeyedEdit<'e> {
    table: &'e TableSchema,
    row_key: String,
    key_components: Vec<String>,
    item: &'e EditItem,
}

/// Caller-scoped validation context
pub struct ValidationSession {
    id: Uuid,
    phase: SessionPhase,
    schema: Arc<SchemaIndex>,
    store: Arc<dyn ConfigStore>,
    cache: GlobalCache,
    processor: Arc<dyn SchemaProcessor>,
    batch_size: usize,
    requests: RequestCache,
    /// Running row count per table with a max-elements limit
    counts: HashMap<String, usize>,
    document: Document,
}

impl ValidationSession {
    pub(crate) fn new(
        schema: Arc<SchemaIndex>,
        store: Arc<dyn ConfigStore>,
        cache: GlobalCache,
        processor: Arc<dyn SchemaProcessor>,
        batch_size: usize,
    ) -> Self {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        log_event_with_fields(Event::SessionOpen, &[("session", id_str.as_str())]);

        Self {
            id,
            phase: SessionPhase::Open,
            schema,
            store,
            cache,
            processor,
            batch_size: batch_size.max(1),
            requests: RequestCache::new(),
            counts: HashMap::new(),
            document: Document::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Merged subject of every accepted edit
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn request_cache(&self) -> &RequestCache {
        &self.requests
    }

    /// Validates `edits` as one unit. The first violation is returned and
    /// the session is left as it was before the call.
    pub async fn validate(&mut self, edits: &[EditItem]) -> CvlResult<()> {
        if self.phase == SessionPhase::Closed {
            return Err(CvlError::internal("Session is closed"));
        }
        self.phase = SessionPhase::Staging;

        let requests = self.requests.clone();
        let counts = self.counts.clone();

        match self.validate_edits(edits).await {
            Ok(()) => {
                let session = self.id.to_string();
                let count = edits.len().to_string();
                log_event_with_fields(
                    Event::ValidationAccepted,
                    &[("edits", count.as_str()), ("session", session.as_str())],
                );
                Ok(())
            }
            Err(e) => {
                self.requests = requests;
                self.counts = counts;
                let session = self.id.to_string();
                log_event_with_fields(
                    Event::ValidationRejected,
                    &[
                        ("code", e.code().code()),
                        ("error", e.message()),
                        ("session", session.as_str()),
                        ("table", e.info().table.as_str()),
                    ],
                );
                Err(e)
            }
        }
    }

    /// Releases all per-session state. Safe to call at any point, any
    /// number of times.
    pub fn close(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.phase = SessionPhase::Closed;
        self.requests.clear();
        self.counts.clear();
        self.document = Document::new();

        let session = self.id.to_string();
        log_event_with_fields(Event::SessionClose, &[("session", session.as_str())]);
    }

    async fn validate_edits(&mut self, edits: &[EditItem]) -> CvlResult<()> {
        let schema = Arc::clone(&self.schema);
        let keyed = edits
            .iter()
            .map(|item| keyed_edit(&schema, item))
            .collect::<CvlResult<Vec<_>>>()?;

        // Dependent-only rows are context for this call's checks, and still
        // occupy table slots
        for edit in keyed.iter().filter(|e| !e.item.validate_now) {
            self.check_max_elements(edit).await?;
            self.requests.record(
                &edit.table.name,
                &edit.row_key,
                edit.item.operation,
                edit.item.fields.clone(),
            );
        }

        let checked: Vec<&KeyedEdit> = keyed.iter().filter(|e| e.item.validate_now).collect();
        for edit in &checked {
            self.check_existence(edit).await?;
            if edit.item.operation == Operation::Delete && is_whole_row(&edit.item.fields) {
                integrity::check_delete(
                    &schema,
                    self.store.as_ref(),
                    &self.requests,
                    self.batch_size,
                    edit.table,
                    &edit.row_key,
                    &edit.key_components,
                )
                .await?;
            }
            self.check_max_elements(edit).await?;
            self.requests.record(
                &edit.table.name,
                &edit.row_key,
                edit.item.operation,
                edit.item.fields.clone(),
            );
        }

        // One subject per operation, in first-seen order
        let mut groups: Vec<(Operation, TableRows)> = Vec::new();
        for edit in &checked {
            let op = edit.item.operation;
            let index = match groups.iter().position(|(o, _)| *o == op) {
                Some(index) => index,
                None => {
                    groups.push((op, TableRows::new()));
                    groups.len() - 1
                }
            };
            groups[index]
                .1
                .entry(edit.table.name.clone())
                .or_default()
                .entry(edit.row_key.clone())
                .or_default()
                .extend(edit.item.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut accepted = Vec::with_capacity(groups.len());
        for (op, rows) in groups {
            let subject = translate(&schema, &rows)?;
            if op != Operation::None {
                let dependent = if op == Operation::Delete {
                    Document::new()
                } else {
                    DependencyResolver::new(&schema, self.store.as_ref(), self.batch_size)
                        .with_cache(&self.cache)
                        .resolve_subject(&subject, &self.requests)
                        .await?
                };
                self.processor.validate(&subject, Some(&dependent), op)?;
            }
            accepted.push((op, rows, subject));
        }

        for (op, rows, subject) in accepted {
            match op {
                Operation::Delete => {
                    for (table_name, table_rows) in &rows {
                        let Some(table) = schema.table(table_name) else {
                            continue;
                        };
                        for (row_key, fields) in table_rows {
                            let staged = StagedState::from_edit(op, fields);
                            overlay_row(&schema, table, &mut self.document, row_key, &staged)?;
                        }
                    }
                }
                _ => self.document.merge_from(subject),
            }
            self.cache.fold(&rows, op).await?;
        }
        self.document.compact_if_sparse();
        Ok(())
    }

    async fn check_existence(&self, edit: &KeyedEdit<'_>) -> CvlResult<()> {
        let op = edit.item.operation;
        if op == Operation::None {
            return Ok(());
        }

        let exists = match self.requests.exists(&edit.table.name, &edit.row_key) {
            Some(known) => known,
            None => self.store.exists(&edit.table.store_key(&edit.row_key)).await?,
        };

        match op {
            Operation::Create if exists => Err(CvlError::key_already_exists(
                &edit.table.name,
                edit.key_components.clone(),
            )),
            Operation::Update | Operation::Delete if !exists => Err(CvlError::key_not_found(
                &edit.table.name,
                edit.key_components.clone(),
            )),
            _ => Ok(()),
        }
    }

    async fn check_max_elements(&mut self, edit: &KeyedEdit<'_>) -> CvlResult<()> {
        let Some(limit) = edit.table.max_elements else {
            return Ok(());
        };
        let op = edit.item.operation;
        let removes_row = op == Operation::Delete && is_whole_row(&edit.item.fields);
        if op != Operation::Create && !removes_row {
            return Ok(());
        }

        let count = match self.counts.get(&edit.table.name) {
            Some(count) => *count,
            None => {
                let stored = self.store.keys(&edit.table.store_prefix()).await?.len();
                self.counts.insert(edit.table.name.clone(), stored);
                stored
            }
        };

        if removes_row {
            self.counts.insert(edit.table.name.clone(), count.saturating_sub(1));
            return Ok(());
        }
        if count + 1 > limit {
            return Err(CvlError::max_elements(&edit.table.name, limit)
                .at(edit.table.name.as_str(), edit.key_components.clone()));
        }
        self.counts.insert(edit.table.name.clone(), count + 1);
        Ok(())
    }
}

impl Drop for ValidationSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn keyed_edit<'e>(schema: &'e SchemaIndex, item: &'e EditItem) -> CvlResult<KeyedEdit<'e>> {
    let (table, row_key) = schema
        .split_store_key(&item.key)
        .ok_or_else(|| CvlError::invalid_key(&item.key, "no table matches the key"))?;

    // Arity and repeating-component shape
    expand_key(table, row_key)?;
    let key_components = table
        .split_key(row_key)
        .ok_or_else(|| CvlError::invalid_key(&item.key, "key does not match the table's key pattern"))?;

    Ok(KeyedEdit {
        table,
        row_key: row_key.to_string(),
        key_components,
        item,
    })
}
