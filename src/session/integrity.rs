//! Leafref delete integrity
//!
//! A row may not be deleted while a row of another table still points at
//! it through a leafref. The session's own staged edits are consulted
//! before the store, so deleting the referencing row earlier in the same
//! session clears the way.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{CvlError, CvlErrorCode, CvlResult};
use crate::schema::{SchemaIndex, TableSchema, LEAF_LIST_SUFFIX};
use crate::store::{fetch_batched, ConfigStore};
use crate::translate::{split_leaf_list, unwrap_hash_ref, FieldMap};

use super::request_cache::{FieldPatch, RequestCache, StagedState};

/// Checks deleting `row_key` of `table` leaves no dangling leafref.
pub(crate) async fn check_delete(
    schema: &SchemaIndex,
    store: &dyn ConfigStore,
    requests: &RequestCache,
    batch_size: usize,
    table: &TableSchema,
    row_key: &str,
    key_components: &[String],
) -> CvlResult<()> {
    let reverse = schema.reverse_leafrefs();
    let referenced = reverse.referenced_fields(&table.name);
    if referenced.is_empty() {
        return Ok(());
    }

    let mut own_fields: Option<FieldMap> = None;
    for field in referenced {
        let values: Vec<String> = match table.key_segments.iter().position(|s| s.name == field) {
            Some(index) => key_components
                .get(index)
                .map(|c| split_leaf_list(c).map(str::to_string).collect())
                .unwrap_or_default(),
            None => {
                if own_fields.is_none() {
                    own_fields = Some(current_fields(store, requests, table, row_key).await?);
                }
                own_fields
                    .as_ref()
                    .map(|f| field_values(table, f, &field))
                    .unwrap_or_default()
            }
        };
        if values.is_empty() {
            continue;
        }

        for (ref_table_name, ref_field) in reverse.referrers(&table.name, &field) {
            let Some(ref_table) = schema.table(&ref_table_name) else {
                continue;
            };
            let found = find_referrer(store, requests, batch_size, ref_table, &ref_field, &values).await?;
            if let Some(ref_key) = found {
                return Err(CvlError::new(
                    CvlErrorCode::SemanticLeafrefIntegrity,
                    format!(
                        "Entry is still referenced by '{}' field '{}'",
                        ref_table.store_key(&ref_key),
                        ref_field
                    ),
                )
                .at(table.name.as_str(), key_components.to_vec())
                .field(field.as_str(), values.join(",")));
            }
        }
    }
    Ok(())
}

/// The row as the session currently sees it
async fn current_fields(
    store: &dyn ConfigStore,
    requests: &RequestCache,
    table: &TableSchema,
    row_key: &str,
) -> CvlResult<FieldMap> {
    match requests.state(&table.name, row_key) {
        Some(StagedState::Present(fields)) => Ok(fields),
        Some(StagedState::Deleted) => Ok(FieldMap::new()),
        Some(StagedState::Overlay(patch)) => {
            let mut fields = stored_fields(store, table, row_key).await?;
            patch.apply(&mut fields);
            Ok(fields)
        }
        None => stored_fields(store, table, row_key).await,
    }
}

async fn stored_fields(store: &dyn ConfigStore, table: &TableSchema, row_key: &str) -> CvlResult<FieldMap> {
    let rows = store.get_rows(&[table.store_key(row_key)]).await?;
    Ok(rows.into_iter().next().flatten().unwrap_or_default())
}

/// First row of `ref_table` whose `ref_field` holds one of `values`
async fn find_referrer(
    store: &dyn ConfigStore,
    requests: &RequestCache,
    batch_size: usize,
    ref_table: &TableSchema,
    ref_field: &str,
    values: &[String],
) -> CvlResult<Option<String>> {
    let key_index = ref_table.key_segments.iter().position(|s| s.name == ref_field);

    // Session first
    let mut decided: BTreeSet<String> = BTreeSet::new();
    let mut overlays: BTreeMap<String, FieldPatch> = BTreeMap::new();
    for (row_key, state) in requests.rows(&ref_table.name) {
        match state {
            StagedState::Deleted => {
                decided.insert(row_key);
            }
            StagedState::Present(fields) => {
                let refers = match key_index {
                    Some(index) => key_refers(ref_table, index, &row_key, values),
                    None => field_refers(ref_table, &fields, ref_field, values),
                };
                if refers {
                    return Ok(Some(row_key));
                }
                decided.insert(row_key);
            }
            StagedState::Overlay(patch) => {
                overlays.insert(row_key, patch);
            }
        }
    }

    // Then the store
    let prefix = ref_table.store_prefix();
    let candidates: Vec<String> = store
        .keys(&prefix)
        .await?
        .into_iter()
        .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
        .filter(|row_key| !decided.contains(row_key))
        .collect();

    if let Some(index) = key_index {
        return Ok(candidates
            .into_iter()
            .find(|row_key| key_refers(ref_table, index, row_key, values)));
    }

    let store_keys: Vec<String> = candidates.iter().map(|k| ref_table.store_key(k)).collect();
    let rows = fetch_batched(store, &store_keys, batch_size).await?;
    for (row_key, fields) in candidates.into_iter().zip(rows) {
        let Some(mut fields) = fields else {
            continue;
        };
        if let Some(patch) = overlays.get(&row_key) {
            patch.apply(&mut fields);
        }
        if field_refers(ref_table, &fields, ref_field, values) {
            return Ok(Some(row_key));
        }
    }
    Ok(None)
}

fn key_refers(table: &TableSchema, index: usize, row_key: &str, values: &[String]) -> bool {
    table
        .split_key(row_key)
        .and_then(|components| components.get(index).cloned())
        .map_or(false, |component| {
            split_leaf_list(&component).any(|v| values.iter().any(|wanted| wanted == v))
        })
}

fn field_refers(table: &TableSchema, fields: &FieldMap, field: &str, values: &[String]) -> bool {
    field_values(table, fields, field)
        .iter()
        .any(|v| values.contains(v))
}

/// Values of `field` in a flat row, leaf-lists split, hash-refs unwrapped
fn field_values(table: &TableSchema, fields: &FieldMap, field: &str) -> Vec<String> {
    let mut values = Vec::new();
    if let Some(value) = fields.get(field) {
        if table.is_leaf_list(field) {
            values.extend(split_leaf_list(value).map(|v| unwrap_hash_ref(v).to_string()));
        } else if !value.is_empty() {
            values.push(unwrap_hash_ref(value).to_string());
        }
    }
    if let Some(value) = fields.get(&format!("{}{}", field, LEAF_LIST_SUFFIX)) {
        values.extend(split_leaf_list(value).map(|v| unwrap_hash_ref(v).to_string()));
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, SchemaModule, TableDef};

    fn table() -> TableSchema {
        let index = SchemaIndex::build(vec![SchemaModule::new(
            "sonic-vlan",
            vec![TableDef::new("VLAN", "VLAN|{name}").field(FieldDef::string("members").leaf_list())],
        )])
        .unwrap();
        index.table("VLAN").unwrap().clone()
    }

    #[test]
    fn test_field_values_split_and_unwrap() {
        let table = table();
        let mut fields = FieldMap::new();
        fields.insert("members@".into(), "[PORT|Ethernet0],Ethernet4".into());
        assert_eq!(field_values(&table, &fields, "members"), vec!["Ethernet0", "Ethernet4"]);
    }

    #[test]
    fn test_key_refers_checks_component() {
        let table = table();
        assert!(key_refers(&table, 0, "Vlan10", &["Vlan10".to_string()]));
        assert!(!key_refers(&table, 0, "Vlan100", &["Vlan10".to_string()]));
    }
}
