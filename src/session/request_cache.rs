//! Per-session record of validated edits
//!
//! Later edits (and the dependency resolver) see earlier ones through
//! this cache instead of the store, which has not been written yet.

use std::collections::{BTreeMap, BTreeSet};

use crate::schema::LEAF_LIST_SUFFIX;
use crate::translate::{FieldMap, NULL_FIELD};

use super::edit::Operation;

/// Field name without the leaf-list marker
fn base_name(name: &str) -> &str {
    name.strip_suffix(LEAF_LIST_SUFFIX).unwrap_or(name)
}

/// Removes `name` in both its plain and leaf-list spelling
fn remove_field(fields: &mut FieldMap, name: &str) {
    let base = base_name(name);
    fields.remove(base);
    fields.remove(&format!("{}{}", base, LEAF_LIST_SUFFIX));
}

/// A delete without fields (or with only the placeholder) removes the row
pub fn is_whole_row(fields: &FieldMap) -> bool {
    fields.keys().all(|name| name == NULL_FIELD)
}

/// Field changes to lay over a stored row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPatch {
    pub set: FieldMap,
    /// Base names of removed fields
    pub removed: BTreeSet<String>,
}

impl FieldPatch {
    pub fn setting(fields: FieldMap) -> Self {
        Self {
            set: fields,
            removed: BTreeSet::new(),
        }
    }

    pub fn removing<'a>(names: impl IntoIterator<Item = &'a String>) -> Self {
        Self {
            set: FieldMap::new(),
            removed: names.into_iter().map(|n| base_name(n).to_string()).collect(),
        }
    }

    /// Applies the patch to a stored row in place
    pub fn apply(&self, fields: &mut FieldMap) {
        for name in &self.removed {
            remove_field(fields, name);
        }
        for (name, value) in &self.set {
            if name == NULL_FIELD {
                continue;
            }
            fields.remove(NULL_FIELD);
            remove_field(fields, name);
            fields.insert(name.clone(), value.clone());
        }
    }

    /// Folds a later patch into this one
    fn then(&mut self, later: FieldPatch) {
        for name in later.removed {
            remove_field(&mut self.set, &name);
            self.removed.insert(name);
        }
        for (name, value) in later.set {
            self.removed.remove(base_name(&name));
            remove_field(&mut self.set, &name);
            self.set.insert(name, value);
        }
    }
}

/// Net effect of a session's edits on one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedState {
    /// Row exists with exactly these fields (created in session)
    Present(FieldMap),
    /// Stored row with changes laid over it
    Overlay(FieldPatch),
    /// Row removed in session
    Deleted,
}

impl StagedState {
    /// State produced by a single edit
    pub fn from_edit(op: Operation, fields: &FieldMap) -> Self {
        match op {
            Operation::Create => StagedState::Present(fields.clone()),
            Operation::Update | Operation::None => StagedState::Overlay(FieldPatch::setting(fields.clone())),
            Operation::Delete if is_whole_row(fields) => StagedState::Deleted,
            Operation::Delete => StagedState::Overlay(FieldPatch::removing(fields.keys())),
        }
    }

    /// State after `next` is applied on top of this one
    pub fn then(self, next: StagedState) -> StagedState {
        match (self, next) {
            (_, StagedState::Present(fields)) => StagedState::Present(fields),
            (_, StagedState::Deleted) => StagedState::Deleted,
            (StagedState::Present(mut fields), StagedState::Overlay(patch)) => {
                patch.apply(&mut fields);
                StagedState::Present(fields)
            }
            (StagedState::Overlay(mut patch), StagedState::Overlay(later)) => {
                patch.then(later);
                StagedState::Overlay(patch)
            }
            // Updating a deleted row is rejected before it is recorded
            (StagedState::Deleted, StagedState::Overlay(_)) => StagedState::Deleted,
        }
    }

    /// Whether the row exists after this state
    pub fn exists(&self) -> bool {
        !matches!(self, StagedState::Deleted)
    }
}

/// One recorded edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEdit {
    pub op: Operation,
    pub fields: FieldMap,
}

/// table -> row key -> edits in submission order
#[derive(Debug, Clone, Default)]
pub struct RequestCache {
    tables: BTreeMap<String, BTreeMap<String, Vec<StagedEdit>>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, table: &str, row_key: &str, op: Operation, fields: FieldMap) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .entry(row_key.to_string())
            .or_default()
            .push(StagedEdit { op, fields });
    }

    /// Edits recorded for one row
    pub fn edits(&self, table: &str, row_key: &str) -> &[StagedEdit] {
        self.tables
            .get(table)
            .and_then(|rows| rows.get(row_key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Net state of one row, `None` when the session never touched it
    pub fn state(&self, table: &str, row_key: &str) -> Option<StagedState> {
        fold(self.edits(table, row_key))
    }

    /// Net state of every touched row of `table`, by row key
    pub fn rows(&self, table: &str) -> Vec<(String, StagedState)> {
        let Some(rows) = self.tables.get(table) else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|(key, edits)| fold(edits).map(|state| (key.clone(), state)))
            .collect()
    }

    /// Whether the row exists as far as the session knows
    pub fn exists(&self, table: &str, row_key: &str) -> Option<bool> {
        self.state(table, row_key).map(|s| s.exists())
    }

    /// Rows of `table` created in session and still present
    pub fn created_count(&self, table: &str) -> usize {
        self.rows(table)
            .iter()
            .filter(|(_, state)| matches!(state, StagedState::Present(_)))
            .count()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(|rows| rows.values().map(Vec::len).sum::<usize>()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

fn fold(edits: &[StagedEdit]) -> Option<StagedState> {
    edits
        .iter()
        .map(|e| StagedState::from_edit(e.op, &e.fields))
        .reduce(StagedState::then)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_delete_then_create_is_present() {
        let mut cache = RequestCache::new();
        cache.record("PORT", "Ethernet0", Operation::Delete, FieldMap::new());
        assert_eq!(cache.exists("PORT", "Ethernet0"), Some(false));

        cache.record("PORT", "Ethernet0", Operation::Create, fields(&[("mtu", "1500")]));
        assert_eq!(
            cache.state("PORT", "Ethernet0"),
            Some(StagedState::Present(fields(&[("mtu", "1500")])))
        );
    }

    #[test]
    fn test_updates_fold_into_patch() {
        let mut cache = RequestCache::new();
        cache.record("PORT", "Ethernet0", Operation::Update, fields(&[("mtu", "1500")]));
        cache.record("PORT", "Ethernet0", Operation::Delete, fields(&[("mtu", "")]));
        cache.record("PORT", "Ethernet0", Operation::Update, fields(&[("lanes@", "0,1")]));

        let Some(StagedState::Overlay(patch)) = cache.state("PORT", "Ethernet0") else {
            panic!("expected overlay");
        };
        let mut stored = fields(&[("mtu", "9100"), ("lanes@", "4"), ("speed", "100000")]);
        patch.apply(&mut stored);
        assert_eq!(stored, fields(&[("lanes@", "0,1"), ("speed", "100000")]));
    }

    #[test]
    fn test_create_then_update_stays_present() {
        let mut cache = RequestCache::new();
        cache.record("VLAN", "Vlan10", Operation::Create, fields(&[("NULL", "NULL")]));
        cache.record("VLAN", "Vlan10", Operation::Update, fields(&[("vlanid", "10")]));
        assert_eq!(
            cache.state("VLAN", "Vlan10"),
            Some(StagedState::Present(fields(&[("vlanid", "10")])))
        );
        assert_eq!(cache.created_count("VLAN"), 1);
    }

    #[test]
    fn test_patch_replaces_leaf_list_spelling() {
        let patch = FieldPatch::setting(fields(&[("lanes", "8")]));
        let mut stored = fields(&[("lanes@", "0,1")]);
        patch.apply(&mut stored);
        assert_eq!(stored, fields(&[("lanes", "8")]));
    }

    #[test]
    fn test_untouched_row_has_no_state() {
        let cache = RequestCache::new();
        assert_eq!(cache.exists("PORT", "Ethernet0"), None);
        assert!(cache.is_empty());
    }
}
