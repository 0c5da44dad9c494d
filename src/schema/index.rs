//! Schema index: per-table metadata derived once from the loaded modules
//!
//! Built at startup, immutable afterwards and shared read-only by every
//! session. Besides the key shape and field declarations it derives:
//! - leafref targets (table + leaf) parsed out of the raw path expressions
//! - the tables each table's `must` expressions mention (`dependent_tables`)
//! - lazily, the reverse leafref index used by delete-integrity checks

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use super::errors::{SchemaError, SchemaResult};
use super::types::{FieldDef, MustDef, SchemaModule, TableDef};

/// Default store key delimiter
pub const DEFAULT_KEY_DELIMITER: &str = "|";

/// Suffix marking array-valued fields in the store (`members@`)
pub const LEAF_LIST_SUFFIX: char = '@';

static SINGLE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{([A-Za-z0-9_\-]+)\}$").expect("valid regex pattern"));

static REPEATING_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\{([A-Za-z0-9_\-]+)\},\)\*$").expect("valid regex pattern"));

static LEAFREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[A-Za-z0-9_\-]+:)?([A-Za-z0-9_\-]+)_LIST/(?:[A-Za-z0-9_\-]+:)?([A-Za-z0-9_\-]+)$")
        .expect("valid regex pattern")
});

static PREDICATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("valid regex pattern"));

/// One component of a composite key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySegment {
    pub name: String,
    /// `({name},)*`: the component holds a comma list, one list instance per value
    pub repeating: bool,
}

/// Parsed leafref target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LeafrefTarget {
    pub table: String,
    pub field: String,
}

/// Extracts the target table and leaf from a leafref path.
///
/// `/sonic-port:sonic-port/sonic-port:PORT/sonic-port:PORT_LIST/sonic-port:name`
/// resolves to `PORT` / `name`. Predicates (`[...]`) are ignored.
pub fn parse_leafref(path: &str) -> Option<LeafrefTarget> {
    let stripped = PREDICATE_RE.replace_all(path.trim(), "");
    let caps = LEAFREF_RE.captures(&stripped)?;
    Some(LeafrefTarget {
        table: caps[1].to_string(),
        field: caps[2].to_string(),
    })
}

/// Metadata for one configuration table
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub module: String,
    pub key_pattern: String,
    pub key_delimiter: String,
    pub key_segments: Vec<KeySegment>,
    pub map_leaf: Option<(String, String)>,
    pub fields: BTreeMap<String, FieldDef>,
    /// Field name -> raw leafref paths
    pub leafrefs: BTreeMap<String, Vec<String>>,
    /// Field name -> parsed leafref targets
    pub leafref_targets: BTreeMap<String, Vec<LeafrefTarget>>,
    /// Schema node -> must expression
    pub must: BTreeMap<String, MustDef>,
    /// Other tables whose data the must expressions need
    pub dependent_tables: BTreeSet<String>,
    /// `None` means unbounded
    pub max_elements: Option<usize>,
    patterns: BTreeMap<String, Regex>,
}

impl TableSchema {
    fn from_def(module: &str, def: TableDef, default_delimiter: &str) -> SchemaResult<Self> {
        let key_delimiter = def
            .key_delimiter
            .clone()
            .unwrap_or_else(|| default_delimiter.to_string());
        if key_delimiter.is_empty() {
            return Err(SchemaError::invalid_key_pattern(&def.name, "empty key delimiter"));
        }

        let mut parts = def.key_pattern.split(key_delimiter.as_str());
        if parts.next() != Some(def.name.as_str()) {
            return Err(SchemaError::invalid_key_pattern(
                &def.name,
                format!("'{}' must start with the table name", def.key_pattern),
            ));
        }

        let mut key_segments = Vec::new();
        for part in parts {
            let segment = if let Some(caps) = SINGLE_KEY_RE.captures(part) {
                KeySegment { name: caps[1].to_string(), repeating: false }
            } else if let Some(caps) = REPEATING_KEY_RE.captures(part) {
                KeySegment { name: caps[1].to_string(), repeating: true }
            } else {
                return Err(SchemaError::invalid_key_pattern(
                    &def.name,
                    format!("unrecognised key component '{}'", part),
                ));
            };
            if key_segments.iter().any(|s: &KeySegment| s.name == segment.name) {
                return Err(SchemaError::invalid_key_pattern(
                    &def.name,
                    format!("key component '{}' repeated", segment.name),
                ));
            }
            key_segments.push(segment);
        }
        if key_segments.is_empty() {
            return Err(SchemaError::invalid_key_pattern(&def.name, "no key components"));
        }

        let map_leaf = match def.map_leaf {
            None => None,
            Some(pair) if pair.len() == 2 => Some((pair[0].clone(), pair[1].clone())),
            Some(pair) => {
                return Err(SchemaError::invalid_field(
                    &def.name,
                    format!("map_leaf needs exactly two leaves, got {}", pair.len()),
                ))
            }
        };

        let mut fields = BTreeMap::new();
        let mut leafrefs = BTreeMap::new();
        let mut leafref_targets = BTreeMap::new();
        let mut patterns = BTreeMap::new();
        for field in def.fields {
            if field.name.ends_with(LEAF_LIST_SUFFIX) {
                return Err(SchemaError::invalid_field(
                    &def.name,
                    format!("field '{}' must be declared without the '@' suffix", field.name),
                ));
            }
            if !field.leafref.is_empty() {
                let mut targets = Vec::with_capacity(field.leafref.len());
                for path in &field.leafref {
                    let target = parse_leafref(path)
                        .ok_or_else(|| SchemaError::invalid_leafref(&def.name, &field.name, path))?;
                    targets.push(target);
                }
                leafrefs.insert(field.name.clone(), field.leafref.clone());
                leafref_targets.insert(field.name.clone(), targets);
            }
            if let Some(pattern) = &field.pattern {
                let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    SchemaError::invalid_field(
                        &def.name,
                        format!("field '{}' has an invalid pattern: {}", field.name, e),
                    )
                })?;
                patterns.insert(field.name.clone(), re);
            }
            let name = field.name.clone();
            if fields.insert(name.clone(), field).is_some() {
                return Err(SchemaError::invalid_field(
                    &def.name,
                    format!("field '{}' declared twice", name),
                ));
            }
        }

        let mut must = BTreeMap::new();
        for rule in def.must {
            must.insert(rule.node.clone(), rule);
        }

        Ok(Self {
            name: def.name,
            module: module.to_string(),
            key_pattern: def.key_pattern,
            key_delimiter,
            key_segments,
            map_leaf,
            fields,
            leafrefs,
            leafref_targets,
            must,
            dependent_tables: BTreeSet::new(),
            max_elements: def.max_elements,
            patterns,
        })
    }

    /// Name of the YANG list holding this table's rows
    pub fn list_name(&self) -> String {
        format!("{}_LIST", self.name)
    }

    /// Key component names in key order
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.key_segments.iter().map(|s| s.name.as_str())
    }

    pub fn is_key(&self, field: &str) -> bool {
        self.key_segments.iter().any(|s| s.name == field)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn is_leaf_list(&self, name: &str) -> bool {
        self.fields.get(name).map_or(false, |f| f.leaf_list)
    }

    /// Compiled, anchored pattern for a field
    pub fn pattern(&self, field: &str) -> Option<&Regex> {
        self.patterns.get(field)
    }

    /// Names of every leaf a row of this table maps onto
    pub fn leaf_names(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.key_names().collect();
        names.extend(self.fields.keys().map(String::as_str));
        if let Some((name_leaf, value_leaf)) = &self.map_leaf {
            names.insert(name_leaf);
            names.insert(value_leaf);
        }
        names
    }

    /// Splits a row key (store key without the table prefix) into its
    /// components. The last component absorbs any surplus delimiters.
    pub fn split_key(&self, row_key: &str) -> Option<Vec<String>> {
        let count = self.key_segments.len();
        let parts: Vec<String> = row_key
            .splitn(count, self.key_delimiter.as_str())
            .map(str::to_string)
            .collect();
        if parts.len() != count || parts.iter().any(String::is_empty) {
            return None;
        }
        Some(parts)
    }

    /// Full store key for a row key
    pub fn store_key(&self, row_key: &str) -> String {
        format!("{}{}{}", self.name, self.key_delimiter, row_key)
    }

    /// Prefix shared by every store key of this table
    pub fn store_prefix(&self) -> String {
        format!("{}{}", self.name, self.key_delimiter)
    }
}

/// Reverse leafref index: (table, field) -> fields elsewhere pointing at it
#[derive(Debug, Default)]
pub struct ReverseLeafrefIndex {
    referrers: BTreeMap<(String, String), BTreeSet<(String, String)>>,
}

impl ReverseLeafrefIndex {
    fn build<'a>(tables: impl Iterator<Item = &'a TableSchema>) -> Self {
        let mut referrers: BTreeMap<(String, String), BTreeSet<(String, String)>> = BTreeMap::new();
        for table in tables {
            for (field, targets) in &table.leafref_targets {
                for target in targets {
                    referrers
                        .entry((target.table.clone(), target.field.clone()))
                        .or_default()
                        .insert((table.name.clone(), field.clone()));
                }
            }
        }
        Self { referrers }
    }

    /// Every (other-table, other-field) whose leafref points at `table`/`field`
    pub fn referrers(&self, table: &str, field: &str) -> Vec<(String, String)> {
        self.referrers
            .get(&(table.to_string(), field.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fields of `table` that anything refers to
    pub fn referenced_fields(&self, table: &str) -> Vec<String> {
        self.referrers
            .keys()
            .filter(|(t, _)| t == table)
            .map(|(_, f)| f.clone())
            .collect()
    }
}

/// Immutable table metadata for the whole schema
#[derive(Debug, Default)]
pub struct SchemaIndex {
    tables: BTreeMap<String, TableSchema>,
    reverse: OnceCell<ReverseLeafrefIndex>,
}

impl SchemaIndex {
    /// Builds the index from parsed modules using the default delimiter.
    pub fn build(modules: Vec<SchemaModule>) -> SchemaResult<Self> {
        Self::build_with_delimiter(modules, DEFAULT_KEY_DELIMITER)
    }

    /// Builds the index from parsed modules.
    ///
    /// Tables that omit `key_delimiter` use `default_delimiter`.
    pub fn build_with_delimiter(
        modules: Vec<SchemaModule>,
        default_delimiter: &str,
    ) -> SchemaResult<Self> {
        let mut tables = BTreeMap::new();
        for module in modules {
            for def in module.tables {
                let table = TableSchema::from_def(&module.module, def, default_delimiter)?;
                if tables.contains_key(&table.name) {
                    return Err(SchemaError::duplicate_table(&table.name));
                }
                tables.insert(table.name.clone(), table);
            }
        }

        Self::link_dependent_tables(&mut tables);

        Ok(Self {
            tables,
            reverse: OnceCell::new(),
        })
    }

    /// Fills `dependent_tables` by looking for other table names inside
    /// each table's must expressions.
    fn link_dependent_tables(tables: &mut BTreeMap<String, TableSchema>) {
        let matchers: Vec<(String, Regex)> = tables
            .keys()
            .filter_map(|name| {
                let re = Regex::new(&format!(
                    r"(?:^|[^A-Za-z0-9_]){}(?:[^A-Za-z0-9_]|$)",
                    regex::escape(name)
                ))
                .ok()?;
                Some((name.clone(), re))
            })
            .collect();

        for table in tables.values_mut() {
            if table.must.is_empty() {
                continue;
            }
            for (name, re) in &matchers {
                if *name == table.name {
                    continue;
                }
                if table.must.values().any(|rule| re.is_match(&rule.expr)) {
                    table.dependent_tables.insert(name.clone());
                }
            }
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Splits a full store key into its table and row key.
    ///
    /// The longest table name followed by its own delimiter wins.
    pub fn split_store_key<'k>(&self, key: &'k str) -> Option<(&TableSchema, &'k str)> {
        self.tables
            .values()
            .filter_map(|table| {
                let rest = key.strip_prefix(table.name.as_str())?;
                let row_key = rest.strip_prefix(table.key_delimiter.as_str())?;
                Some((table, row_key))
            })
            .max_by_key(|(table, _)| table.name.len())
    }

    /// Reverse leafref index, computed on first use
    pub fn reverse_leafrefs(&self) -> &ReverseLeafrefIndex {
        self.reverse
            .get_or_init(|| ReverseLeafrefIndex::build(self.tables.values()))
    }

    /// Tables whose data is needed to check `table`: its must dependencies
    /// and every leafref target table.
    pub fn required_tables(&self, table: &str) -> BTreeSet<String> {
        let mut required = BTreeSet::new();
        if let Some(schema) = self.table(table) {
            required.extend(schema.dependent_tables.iter().cloned());
            for targets in schema.leafref_targets.values() {
                required.extend(targets.iter().map(|t| t.table.clone()));
            }
        }
        required.remove(table);
        required
    }
}
