//! Key/Document translation
//!
//! Turns flat store rows (`table -> row key -> field map`) into a
//! schema-shaped [`Document`], and reads rows back out of one.
//!
//! Rules applied per row:
//! - the row key is split per the table's key pattern; repeating
//!   (`({name},)*`) components expand to one list instance per value, across
//!   the Cartesian product of all repeating components
//! - map-leaf tables get one nested list instance per field
//! - `[TABLE|key]` hash-reference values are unwrapped to `key`
//! - `name@` fields (and declared leaf-lists) become leaf-list members
//! - the `NULL` placeholder field of field-less rows is dropped
//!
//! Input maps are ordered, so output is deterministic.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::{Document, NodeId, NodeKind};
use crate::errors::{CvlError, CvlErrorCode, CvlResult};
use crate::schema::{SchemaIndex, TableSchema, LEAF_LIST_SUFFIX};

/// Fields of one row
pub type FieldMap = BTreeMap<String, String>;

/// Rows of several tables: table -> row key -> fields
pub type TableRows = BTreeMap<String, BTreeMap<String, FieldMap>>;

/// Placeholder field stored for rows without fields
pub const NULL_FIELD: &str = "NULL";

static HASH_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[A-Za-z0-9_\-]+\|(.*)\]$").expect("valid regex pattern"));

/// Unwraps `[TABLE|key]` to `key`; anything else is returned unchanged.
pub fn unwrap_hash_ref(value: &str) -> &str {
    match HASH_REF_RE.captures(value).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => value,
    }
}

/// Splits a stored leaf-list value into its members
pub fn split_leaf_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|v| !v.is_empty())
}

/// Expands a row key into one component vector per list instance.
pub fn expand_key(table: &TableSchema, row_key: &str) -> CvlResult<Vec<Vec<String>>> {
    let components = table.split_key(row_key).ok_or_else(|| {
        CvlError::invalid_key(
            row_key,
            format!("expected {} component(s) for pattern '{}'", table.key_segments.len(), table.key_pattern),
        )
        .at(&table.name, Vec::new())
    })?;

    let mut combos: Vec<Vec<String>> = vec![Vec::new()];
    for (segment, component) in table.key_segments.iter().zip(components.iter()) {
        let values: Vec<&str> = if segment.repeating {
            split_leaf_list(component).collect()
        } else {
            vec![component.as_str()]
        };
        if values.is_empty() {
            return Err(CvlError::invalid_key(row_key, format!("empty value list for '{}'", segment.name))
                .at(&table.name, components.clone()));
        }

        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in &values {
                let mut extended = combo.clone();
                extended.push(value.to_string());
                next.push(extended);
            }
        }
        combos = next;
    }
    Ok(combos)
}

/// Translates rows of any number of tables into one document.
pub fn translate(schema: &SchemaIndex, rows: &TableRows) -> CvlResult<Document> {
    let mut doc = Document::new();
    for (table_name, table_rows) in rows {
        let table = schema.table(table_name).ok_or_else(|| {
            CvlError::new(CvlErrorCode::SemanticKeyInvalid, format!("Unknown table '{}'", table_name))
                .at(table_name, Vec::new())
        })?;
        add_table_rows(&mut doc, table, table_rows)?;
    }
    Ok(doc)
}

/// Translates a single row.
pub fn translate_row(
    schema: &SchemaIndex,
    table: &str,
    row_key: &str,
    fields: &FieldMap,
) -> CvlResult<Document> {
    let mut rows = TableRows::new();
    rows.entry(table.to_string())
        .or_default()
        .insert(row_key.to_string(), fields.clone());
    translate(schema, &rows)
}

fn add_table_rows(
    doc: &mut Document,
    table: &TableSchema,
    rows: &BTreeMap<String, FieldMap>,
) -> CvlResult<()> {
    let module = doc.ensure_child(None, &table.module, NodeKind::Module);
    let container = doc.ensure_child(Some(module), &table.name, NodeKind::Container);
    let list_name = table.list_name();

    for (row_key, fields) in rows {
        for combo in expand_key(table, row_key)? {
            let instance_key = combo.join(&table.key_delimiter);
            let instance = doc.add_list_instance(container, list_name.as_str(), instance_key);
            for (segment, value) in table.key_segments.iter().zip(combo.iter()) {
                doc.add_leaf(instance, segment.name.as_str(), value.as_str());
            }
            add_fields(doc, table, instance, fields);
        }
    }
    Ok(())
}

fn add_fields(doc: &mut Document, table: &TableSchema, instance: NodeId, fields: &FieldMap) {
    for (name, value) in fields {
        if name == NULL_FIELD {
            continue;
        }

        if let Some((name_leaf, value_leaf)) = &table.map_leaf {
            let entry = doc.add_list_instance(instance, table.name.as_str(), name.as_str());
            doc.add_leaf(entry, name_leaf.as_str(), name.as_str());
            doc.add_leaf(entry, value_leaf.as_str(), unwrap_hash_ref(value));
            continue;
        }

        let (base, is_array) = match name.strip_suffix(LEAF_LIST_SUFFIX) {
            Some(base) => (base, true),
            None => (name.as_str(), table.is_leaf_list(name)),
        };
        if table.is_key(base) {
            continue;
        }

        if is_array {
            for member in split_leaf_list(value) {
                doc.add_leaf_list_item(instance, base, unwrap_hash_ref(member));
            }
        } else {
            doc.add_leaf(instance, base, unwrap_hash_ref(value));
        }
    }
}

/// Reads every list instance back into flat rows.
///
/// Leaf-lists come back as `name@` with members joined by `,` in document
/// order; rows with no non-key fields come back as `{"NULL": "NULL"}`.
pub fn rows_from_document(schema: &SchemaIndex, doc: &Document) -> CvlResult<TableRows> {
    let mut rows = TableRows::new();
    for &module in doc.roots() {
        for &container in doc.children(Some(module)) {
            let table_name = doc.node(container).name();
            let table = schema.table(table_name).ok_or_else(|| {
                CvlError::internal(format!("Document holds unknown table '{}'", table_name))
            })?;
            let table_rows = rows.entry(table.name.clone()).or_default();

            for &instance in doc.children(Some(container)) {
                let node = doc.node(instance);
                let key = node
                    .key()
                    .ok_or_else(|| CvlError::internal(format!("List instance of '{}' has no key", table.name)))?;
                table_rows.insert(key.to_string(), instance_fields(doc, table, instance));
            }
        }
    }
    Ok(rows)
}

/// Flat field map of one list instance
pub fn instance_fields(doc: &Document, table: &TableSchema, instance: NodeId) -> FieldMap {
    let mut fields = FieldMap::new();
    let mut leaf_lists: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for &child in doc.children(Some(instance)) {
        let node = doc.node(child);
        match node.kind() {
            NodeKind::Leaf if !table.is_key(node.name()) => {
                fields.insert(node.name().to_string(), node.value().unwrap_or_default().to_string());
            }
            NodeKind::LeafList => {
                leaf_lists
                    .entry(node.name().to_string())
                    .or_default()
                    .push(node.value().unwrap_or_default().to_string());
            }
            NodeKind::List => {
                if let Some((name_leaf, value_leaf)) = &table.map_leaf {
                    let name = doc.leaf_values(child, name_leaf).first().map(|v| v.to_string());
                    let value = doc.leaf_values(child, value_leaf).first().map(|v| v.to_string());
                    if let (Some(name), Some(value)) = (name, value) {
                        fields.insert(name, value);
                    }
                }
            }
            _ => {}
        }
    }

    for (name, members) in leaf_lists {
        fields.insert(format!("{}{}", name, LEAF_LIST_SUFFIX), members.join(","));
    }
    if fields.is_empty() {
        fields.insert(NULL_FIELD.to_string(), NULL_FIELD.to_string());
    }
    fields
}
