//! # Dependency Resolver
//!
//! Assembles the dependent document a subject is checked against: rows of
//! the tables its `must` expressions name and the rows its leafrefs point
//! at.
//!
//! Per table:
//! - a table held by the global cache is reused as is, with the session's
//!   staged edits laid over it
//! - otherwise its keys are enumerated (or, for a leafref to a single-key
//!   table, only the referenced keys are named) into a staging area of
//!   [`StagedRow`]s; staged session edits resolve rows without the store
//!   where they can; the remaining `Pending` rows are bulk fetched
//!
//! Loading a table can name further tables (its own `must` dependencies),
//! so resolution repeats until nothing new is wanted.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::cache::GlobalCache;
use crate::document::Document;
use crate::errors::{CvlError, CvlErrorCode, CvlResult};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{SchemaIndex, TableSchema};
use crate::session::{FieldPatch, RequestCache, StagedState};
use crate::store::{fetch_batched, ConfigStore};
use crate::translate::{expand_key, instance_fields, translate, translate_row, FieldMap, TableRows};

/// Staging slot for one dependent row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedRow {
    /// Known to be wanted, not fetched yet
    Pending,
    Fields(FieldMap),
}

/// What is wanted from one table
#[derive(Debug, Clone, PartialEq, Eq)]
enum Want {
    Table,
    Keys(BTreeSet<String>),
}

fn want(pending: &mut BTreeMap<String, Want>, table: &str, wanted: Want) {
    match (pending.get_mut(table), wanted) {
        (None, wanted) => {
            pending.insert(table.to_string(), wanted);
        }
        (Some(slot), Want::Table) => *slot = Want::Table,
        (Some(Want::Keys(keys)), Want::Keys(more)) => keys.extend(more),
        (Some(Want::Table), Want::Keys(_)) => {}
    }
}

/// Resolves dependent data for one validation step
pub struct DependencyResolver<'a> {
    schema: &'a SchemaIndex,
    store: &'a dyn ConfigStore,
    cache: Option<&'a GlobalCache>,
    batch_size: usize,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(schema: &'a SchemaIndex, store: &'a dyn ConfigStore, batch_size: usize) -> Self {
        Self {
            schema,
            store,
            cache: None,
            batch_size: batch_size.max(1),
        }
    }

    /// Reuses tables held by `cache`
    pub fn with_cache(mut self, cache: &'a GlobalCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Every row of the tables `table` depends on.
    pub async fn resolve(&self, table: &str, requests: &RequestCache) -> CvlResult<Document> {
        self.table_schema(table)?;
        let mut pending = BTreeMap::new();
        for required in self.schema.required_tables(table) {
            want(&mut pending, &required, Want::Table);
        }
        self.run(pending, requests).await
    }

    /// Dependent data for every table in `subject`.
    ///
    /// Leafrefs onto single-key tables fetch only the referenced keys.
    pub async fn resolve_subject(&self, subject: &Document, requests: &RequestCache) -> CvlResult<Document> {
        let mut pending = BTreeMap::new();
        let subject_tables: BTreeSet<&str> = subject
            .roots()
            .iter()
            .flat_map(|&module| subject.children(Some(module)))
            .map(|&container| subject.node(container).name())
            .collect();

        for table_name in &subject_tables {
            let table = self.table_schema(table_name)?;
            for dependency in &table.dependent_tables {
                want(&mut pending, dependency, Want::Table);
            }

            for (field, targets) in &table.leafref_targets {
                let values: BTreeSet<String> = subject
                    .list_instances(&table.name)
                    .into_iter()
                    .flat_map(|inst| subject.leaf_values(inst, field))
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                if values.is_empty() {
                    continue;
                }

                // Same-table targets load too: a row may refer to its peers
                for target in targets {
                    let Some(target_table) = self.schema.table(&target.table) else {
                        continue;
                    };
                    if is_single_key(target_table, &target.field) {
                        want(&mut pending, &target.table, Want::Keys(values.clone()));
                    } else {
                        want(&mut pending, &target.table, Want::Table);
                    }
                }
            }
        }

        self.run(pending, requests).await
    }

    async fn run(&self, mut pending: BTreeMap<String, Want>, requests: &RequestCache) -> CvlResult<Document> {
        let mut result = Document::new();
        let mut loaded_tables: BTreeSet<String> = BTreeSet::new();
        let mut loaded_keys: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut rounds = 0usize;

        while let Some((table_name, wanted)) = pending.pop_first() {
            if loaded_tables.contains(&table_name) {
                continue;
            }
            let table = self.table_schema(&table_name)?;

            let doc = match wanted {
                Want::Table => {
                    loaded_tables.insert(table_name.clone());
                    for dependency in &table.dependent_tables {
                        if !loaded_tables.contains(dependency) {
                            want(&mut pending, dependency, Want::Table);
                        }
                    }
                    self.load_table(table, requests).await?
                }
                Want::Keys(keys) => {
                    let seen = loaded_keys.entry(table_name.clone()).or_default();
                    let fresh: BTreeSet<String> = keys.difference(seen).cloned().collect();
                    if fresh.is_empty() {
                        continue;
                    }
                    seen.extend(fresh.iter().cloned());
                    self.load_keys(table, fresh, requests).await?
                }
            };

            result.merge_from(doc);
            rounds += 1;
        }

        let rounds = rounds.to_string();
        let tables = loaded_tables.len().to_string();
        log_event_with_fields(
            Event::DependenciesResolved,
            &[("rounds", rounds.as_str()), ("whole_tables", tables.as_str())],
        );
        Ok(result)
    }

    async fn load_table(&self, table: &TableSchema, requests: &RequestCache) -> CvlResult<Document> {
        if let Some(cache) = self.cache {
            if let Some(cached) = cache.get(&table.name).await? {
                let mut doc = (*cached).clone();
                for (row_key, state) in requests.rows(&table.name) {
                    overlay_row(self.schema, table, &mut doc, &row_key, &state)?;
                }
                debug!(table = %table.name, "dependent table served from cache");
                return Ok(doc);
            }
        }

        let prefix = table.store_prefix();
        let staging: BTreeMap<String, StagedRow> = self
            .store
            .keys(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(|k| (k.to_string(), StagedRow::Pending)))
            .collect();
        self.stage_and_fetch(table, staging, requests, true).await
    }

    async fn load_keys(
        &self,
        table: &TableSchema,
        keys: BTreeSet<String>,
        requests: &RequestCache,
    ) -> CvlResult<Document> {
        let staging = keys.into_iter().map(|k| (k, StagedRow::Pending)).collect();
        self.stage_and_fetch(table, staging, requests, false).await
    }

    /// Resolves staged rows from the session first, then fetches whatever
    /// is still `Pending` in bulk.
    async fn stage_and_fetch(
        &self,
        table: &TableSchema,
        mut staging: BTreeMap<String, StagedRow>,
        requests: &RequestCache,
        whole_table: bool,
    ) -> CvlResult<Document> {
        let mut overlays: BTreeMap<String, FieldPatch> = BTreeMap::new();
        for (row_key, state) in requests.rows(&table.name) {
            if !whole_table && !staging.contains_key(&row_key) {
                continue;
            }
            match state {
                StagedState::Present(fields) => {
                    staging.insert(row_key, StagedRow::Fields(fields));
                }
                StagedState::Deleted => {
                    staging.remove(&row_key);
                }
                StagedState::Overlay(patch) => {
                    staging.entry(row_key.clone()).or_insert(StagedRow::Pending);
                    overlays.insert(row_key, patch);
                }
            }
        }

        let pending: Vec<String> = staging
            .iter()
            .filter(|(_, row)| matches!(row, StagedRow::Pending))
            .map(|(key, _)| key.clone())
            .collect();
        let store_keys: Vec<String> = pending.iter().map(|k| table.store_key(k)).collect();
        let fetched = fetch_batched(self.store, &store_keys, self.batch_size).await?;
        if !pending.is_empty() {
            let count = pending.len().to_string();
            log_event_with_fields(Event::FetchBatch, &[("keys", count.as_str()), ("table", table.name.as_str())]);
        }

        for (row_key, fields) in pending.into_iter().zip(fetched) {
            match fields {
                Some(mut fields) => {
                    if let Some(patch) = overlays.get(&row_key) {
                        patch.apply(&mut fields);
                    }
                    staging.insert(row_key, StagedRow::Fields(fields));
                }
                None => {
                    staging.remove(&row_key);
                }
            }
        }

        let mut rows = BTreeMap::new();
        for (row_key, row) in staging {
            match row {
                StagedRow::Fields(fields) => {
                    rows.insert(row_key, fields);
                }
                StagedRow::Pending => {
                    return Err(CvlError::internal(format!(
                        "Row '{}' of '{}' left unresolved",
                        row_key, table.name
                    )))
                }
            }
        }

        let mut all = TableRows::new();
        all.insert(table.name.clone(), rows);
        translate(self.schema, &all)
    }

    fn table_schema(&self, table: &str) -> CvlResult<&'a TableSchema> {
        self.schema.table(table).ok_or_else(|| {
            CvlError::new(CvlErrorCode::SemanticKeyInvalid, format!("Unknown table '{}'", table))
                .at(table, Vec::new())
        })
    }
}

/// Whether `field` is the only, single-valued key of `table`
fn is_single_key(table: &TableSchema, field: &str) -> bool {
    matches!(table.key_segments.as_slice(), [segment] if segment.name == field && !segment.repeating)
}

/// Lays a staged row state over a document holding the whole table.
pub(crate) fn overlay_row(
    schema: &SchemaIndex,
    table: &TableSchema,
    doc: &mut Document,
    row_key: &str,
    state: &StagedState,
) -> CvlResult<()> {
    match state {
        StagedState::Deleted => remove_row(table, doc, row_key),
        StagedState::Present(fields) => {
            remove_row(table, doc, row_key)?;
            doc.merge_from(translate_row(schema, &table.name, row_key, fields)?);
            Ok(())
        }
        StagedState::Overlay(patch) => {
            for combo in expand_key(table, row_key)? {
                let instance_key = combo.join(&table.key_delimiter);
                let Some(instance) = doc.find_instance(&table.name, &instance_key) else {
                    continue;
                };
                let mut fields = instance_fields(doc, table, instance);
                patch.apply(&mut fields);
                doc.remove_instance(&table.name, &instance_key);
                doc.merge_from(translate_row(schema, &table.name, &instance_key, &fields)?);
            }
            Ok(())
        }
    }
}

/// Detaches every list instance produced by `row_key`
pub(crate) fn remove_row(table: &TableSchema, doc: &mut Document, row_key: &str) -> CvlResult<()> {
    for combo in expand_key(table, row_key)? {
        doc.remove_instance(&table.name, &combo.join(&table.key_delimiter));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, SchemaModule, TableDef};
    use crate::session::Operation;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn schema() -> SchemaIndex {
        SchemaIndex::build(vec![
            SchemaModule::new(
                "sonic-port",
                vec![TableDef::new("PORT", "PORT|{name}")
                    .field(FieldDef::int("mtu", None, None))
                    .field(FieldDef::string("lanes").leaf_list())],
            ),
            SchemaModule::new(
                "sonic-vlan",
                vec![
                    TableDef::new("VLAN", "VLAN|{name}")
                        .field(FieldDef::int("vlanid", Some(1), Some(4094)))
                        .must("vlanid", "count(../../VLAN_INTERFACE/VLAN_INTERFACE_LIST) >= 0"),
                    TableDef::new("VLAN_MEMBER", "VLAN_MEMBER|{vlan_name}|{port}")
                        .field(FieldDef::string("vlan_name").leafref("/sonic-vlan:sonic-vlan/VLAN/VLAN_LIST/name"))
                        .field(FieldDef::string("port").leafref("/sonic-port:sonic-port/PORT/PORT_LIST/name")),
                ],
            ),
            SchemaModule::new(
                "sonic-vlan-interface",
                vec![TableDef::new("VLAN_INTERFACE", "VLAN_INTERFACE|{name}")],
            ),
        ])
        .unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new(4);
        store
            .load_json(&json!({
                "PORT|Ethernet0": {"mtu": "9100"},
                "PORT|Ethernet4": {"mtu": "9100"},
                "PORT|Ethernet8": {"mtu": "9100"},
                "VLAN|Vlan10": {"vlanid": "10"},
                "VLAN|Vlan20": {"vlanid": "20"},
                "VLAN_INTERFACE|Vlan10": {"NULL": "NULL"}
            }))
            .unwrap();
        store
    }

    fn member(schema: &SchemaIndex, key: &str) -> Document {
        translate_row(schema, "VLAN_MEMBER", key, &FieldMap::new()).unwrap()
    }

    #[tokio::test]
    async fn test_leafref_to_single_key_fetches_only_referenced_rows() {
        let schema = schema();
        let store = store();
        let resolver = DependencyResolver::new(&schema, &store, 10);

        let dep = resolver
            .resolve_subject(&member(&schema, "Vlan10|Ethernet4"), &RequestCache::new())
            .await
            .unwrap();

        assert_eq!(dep.list_instances("PORT").len(), 1);
        assert!(dep.find_instance("PORT", "Ethernet4").is_some());
        assert!(dep.find_instance("VLAN", "Vlan10").is_some());
        // Keyed loads do not follow must dependencies
        assert_eq!(dep.list_instances("VLAN_INTERFACE").len(), 0);
        assert_eq!(store.stats().key_scans, 0);
    }

    #[tokio::test]
    async fn test_must_dependencies_reach_fixed_point() {
        let schema = schema();
        let store = store();
        let resolver = DependencyResolver::new(&schema, &store, 10);

        let dep = resolver.resolve("VLAN", &RequestCache::new()).await.unwrap();
        assert_eq!(dep.list_instances("VLAN_INTERFACE").len(), 1);
    }

    #[tokio::test]
    async fn test_staged_edits_shadow_the_store() {
        let schema = schema();
        let store = store();
        let mut requests = RequestCache::new();
        requests.record("VLAN_INTERFACE", "Vlan10", Operation::Delete, FieldMap::new());
        requests.record("VLAN_INTERFACE", "Vlan30", Operation::Create, FieldMap::new());

        let resolver = DependencyResolver::new(&schema, &store, 10);
        let dep = resolver.resolve("VLAN", &requests).await.unwrap();

        assert!(dep.find_instance("VLAN_INTERFACE", "Vlan10").is_none());
        assert!(dep.find_instance("VLAN_INTERFACE", "Vlan30").is_some());
    }

    #[tokio::test]
    async fn test_update_overlays_fetched_fields() {
        let schema = schema();
        let store = store();
        let mut requests = RequestCache::new();
        let mut fields = FieldMap::new();
        fields.insert("lanes@".into(), "0,1".into());
        requests.record("PORT", "Ethernet0", Operation::Update, fields);

        let resolver = DependencyResolver::new(&schema, &store, 10);
        let dep = resolver
            .resolve_subject(&member(&schema, "Vlan10|Ethernet0"), &requests)
            .await
            .unwrap();

        let inst = dep.find_instance("PORT", "Ethernet0").unwrap();
        assert_eq!(dep.leaf_values(inst, "mtu"), vec!["9100"]);
        assert_eq!(dep.leaf_values(inst, "lanes"), vec!["0", "1"]);
    }

    #[tokio::test]
    async fn test_missing_rows_are_dropped() {
        let schema = schema();
        let store = store();
        let resolver = DependencyResolver::new(&schema, &store, 10);

        let dep = resolver
            .resolve_subject(&member(&schema, "Vlan99|Ethernet12"), &RequestCache::new())
            .await
            .unwrap();
        assert!(dep.list_instances("PORT").is_empty());
        assert!(dep.list_instances("VLAN").is_empty());
    }

    #[tokio::test]
    async fn test_cached_table_reused_with_overlay() {
        let schema = Arc::new(schema());
        let store = Arc::new(store());
        let cache = GlobalCache::new(schema.clone(), store.clone(), 4, 10);
        cache.set("VLAN_INTERFACE", 0).await.unwrap();
        let fetched_before = store.stats().rows_fetched;

        let mut requests = RequestCache::new();
        requests.record("VLAN_INTERFACE", "Vlan20", Operation::Create, FieldMap::new());

        let resolver = DependencyResolver::new(&schema, store.as_ref(), 10).with_cache(&cache);
        let dep = resolver.resolve("VLAN", &requests).await.unwrap();

        assert_eq!(dep.list_instances("VLAN_INTERFACE").len(), 2);
        assert_eq!(store.stats().rows_fetched, fetched_before);
        // The cached copy itself is untouched
        let cached = cache.get("VLAN_INTERFACE").await.unwrap().unwrap();
        assert_eq!(cached.list_instances("VLAN_INTERFACE").len(), 1);
    }

    #[test]
    fn test_want_upgrades_to_table() {
        let mut pending = BTreeMap::new();
        want(&mut pending, "PORT", Want::Keys(["Ethernet0".to_string()].into()));
        want(&mut pending, "PORT", Want::Keys(["Ethernet4".to_string()].into()));
        assert_eq!(
            pending["PORT"],
            Want::Keys(["Ethernet0".to_string(), "Ethernet4".to_string()].into())
        );
        want(&mut pending, "PORT", Want::Table);
        want(&mut pending, "PORT", Want::Keys(["Ethernet8".to_string()].into()));
        assert_eq!(pending["PORT"], Want::Table);
    }
}
