//! Hierarchical, schema-shaped documents
//!
//! A [`Document`] is the unit of validation and caching. Nodes live in an
//! arena and are addressed by [`NodeId`]; every node owns the ordered list of
//! its children, so detaching a subtree is removing one id from a vector and
//! reparenting it is pushing that id somewhere else.
//!
//! Shape, for table `PORT` in module `sonic-port`:
//!
//! ```text
//! sonic-port            (Module)
//!   PORT                (Container)
//!     PORT_LIST         (List, key = "Ethernet0")
//!       name            (Leaf = "Ethernet0")
//!       mtu             (Leaf = "9100")
//!       lanes           (LeafList = "0")
//!       lanes           (LeafList = "1")
//! ```
//!
//! Detached subtrees keep their slots until [`Document::compact`] runs.
//! Long-lived documents call [`Document::compact_if_sparse`] after each
//! batch of removals.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

/// Arena slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// YANG level a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Module,
    Container,
    /// List instance; carries its composite key
    List,
    Leaf,
    /// One member of a leaf-list
    LeafList,
}

/// One node of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    kind: NodeKind,
    key: Option<String>,
    value: Option<String>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            key: None,
            value: None,
            children: Vec::new(),
        }
    }

    /// Placeholder left behind when a node is moved to another arena
    fn vacated() -> Self {
        Self::new(String::new(), NodeKind::Leaf)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Same identity for merge purposes: equal tag, and equal key for list
    /// instances.
    pub fn matches(&self, other: &Node) -> bool {
        if self.name != other.name {
            return false;
        }
        match (self.kind, other.kind) {
            (NodeKind::List, NodeKind::List) => self.key == other.key,
            (NodeKind::LeafList, _) | (_, NodeKind::LeafList) => false,
            (a, b) => a == b,
        }
    }
}

/// Arena-backed document tree
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    /// Slots no longer reachable from the roots
    garbage: usize,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Children of `parent`, or the top-level nodes when `parent` is `None`
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => &self.nodes[id.0].children,
            None => &self.roots,
        }
    }

    fn children_mut(&mut self, parent: Option<NodeId>) -> &mut Vec<NodeId> {
        match parent {
            Some(id) => &mut self.nodes[id.0].children,
            None => &mut self.roots,
        }
    }

    pub fn add_root(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = self.alloc(Node::new(name, kind));
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = self.alloc(Node::new(name, kind));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn add_list_instance(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> NodeId {
        let id = self.add_child(parent, name, NodeKind::List);
        self.nodes[id.0].key = Some(key.into());
        id
    }

    pub fn add_leaf(&mut self, parent: NodeId, name: impl Into<String>, value: impl Into<String>) -> NodeId {
        let id = self.add_child(parent, name, NodeKind::Leaf);
        self.nodes[id.0].value = Some(value.into());
        id
    }

    pub fn add_leaf_list_item(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> NodeId {
        let id = self.add_child(parent, name, NodeKind::LeafList);
        self.nodes[id.0].value = Some(value.into());
        id
    }

    /// Returns the existing top-level/child node with this name, creating it
    /// when absent.
    pub fn ensure_child(&mut self, parent: Option<NodeId>, name: &str, kind: NodeKind) -> NodeId {
        let existing = self
            .children(parent)
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].name == name && self.nodes[c.0].kind == kind);
        match (existing, parent) {
            (Some(id), _) => id,
            (None, Some(p)) => self.add_child(p, name, kind),
            (None, None) => self.add_root(name, kind),
        }
    }

    pub(crate) fn set_value(&mut self, id: NodeId, value: Option<String>) {
        self.nodes[id.0].value = value;
    }

    /// Finds the child matching `pattern` (see [`Node::matches`]).
    pub(crate) fn find_matching(&self, parent: Option<NodeId>, pattern: &Node) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].matches(pattern))
    }

    /// Removes every leaf-list member called `name` under `parent`, returning
    /// the position the first one occupied.
    pub(crate) fn remove_leaf_list(&mut self, parent: Option<NodeId>, name: &str) -> Option<usize> {
        let nodes = &self.nodes;
        let children = match parent {
            Some(id) => &self.nodes[id.0].children,
            None => &self.roots,
        };
        let first = children.iter().position(|&c| {
            nodes[c.0].kind == NodeKind::LeafList && nodes[c.0].name == name
        })?;
        let kept: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| !(nodes[c.0].kind == NodeKind::LeafList && nodes[c.0].name == name))
            .collect();
        self.garbage += children.len() - kept.len();
        *self.children_mut(parent) = kept;
        Some(first)
    }

    /// Detaches `child` from `parent`. Its slots stay allocated until the
    /// next compaction.
    pub fn detach(&mut self, parent: Option<NodeId>, child: NodeId) -> bool {
        let children = self.children_mut(parent);
        match children.iter().position(|&c| c == child) {
            Some(pos) => {
                children.remove(pos);
                self.garbage += self.subtree_len(child);
                true
            }
            None => false,
        }
    }

    fn subtree_len(&self, id: NodeId) -> usize {
        1 + self.nodes[id.0]
            .children
            .iter()
            .map(|&c| self.subtree_len(c))
            .sum::<usize>()
    }

    /// Allocated slots, reachable or not
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rebuilds the arena from the roots, dropping unreachable slots.
    ///
    /// Every `NodeId` obtained before the call is invalid afterwards.
    pub fn compact(&mut self) {
        let live = self.nodes.len().saturating_sub(self.garbage);
        let mut nodes = Vec::with_capacity(live);
        let roots = std::mem::take(&mut self.roots);
        for root in roots {
            let moved = self.relocate(root, &mut nodes);
            self.roots.push(moved);
        }
        self.nodes = nodes;
        self.garbage = 0;
    }

    /// Compacts once unreachable slots outnumber reachable ones. Returns
    /// whether it did.
    pub fn compact_if_sparse(&mut self) -> bool {
        if self.garbage > 0 && self.garbage * 2 > self.nodes.len() {
            self.compact();
            return true;
        }
        false
    }

    fn relocate(&mut self, id: NodeId, out: &mut Vec<Node>) -> NodeId {
        let mut node = std::mem::replace(&mut self.nodes[id.0], Node::vacated());
        let children = std::mem::take(&mut node.children);
        let new_id = NodeId(out.len());
        out.push(node);
        for child in children {
            let moved = self.relocate(child, out);
            out[new_id.0].children.push(moved);
        }
        new_id
    }

    pub(crate) fn insert_child(&mut self, parent: Option<NodeId>, position: usize, child: NodeId) {
        let children = self.children_mut(parent);
        let position = position.min(children.len());
        children.insert(position, child);
    }

    /// Moves the subtree rooted at `id` out of `src` into this arena. The
    /// returned node is not attached anywhere yet.
    pub(crate) fn adopt(&mut self, src: &mut Document, id: NodeId) -> NodeId {
        let mut node = std::mem::replace(&mut src.nodes[id.0], Node::vacated());
        let old_children = std::mem::take(&mut node.children);
        let new_id = self.alloc(node);
        for child in old_children {
            let moved = self.adopt(src, child);
            self.nodes[new_id.0].children.push(moved);
        }
        new_id
    }

    /// Top-level node list, taken out of the document
    pub(crate) fn take_roots(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.roots)
    }

    /// Container node for `table`, looked up under every module root
    pub fn table_container(&self, table: &str) -> Option<NodeId> {
        self.roots.iter().find_map(|&module| {
            self.nodes[module.0]
                .children
                .iter()
                .copied()
                .find(|&c| self.nodes[c.0].kind == NodeKind::Container && self.nodes[c.0].name == table)
        })
    }

    /// Module node owning `table`, if the table is present
    pub fn table_module(&self, table: &str) -> Option<NodeId> {
        self.roots.iter().copied().find(|&module| {
            self.nodes[module.0]
                .children
                .iter()
                .any(|&c| self.nodes[c.0].kind == NodeKind::Container && self.nodes[c.0].name == table)
        })
    }

    /// Every list instance of `table`, in document order
    pub fn list_instances(&self, table: &str) -> Vec<NodeId> {
        match self.table_container(table) {
            Some(container) => self.nodes[container.0]
                .children
                .iter()
                .copied()
                .filter(|&c| self.nodes[c.0].kind == NodeKind::List)
                .collect(),
            None => Vec::new(),
        }
    }

    /// List instance of `table` whose key attribute equals `key`
    pub fn find_instance(&self, table: &str, key: &str) -> Option<NodeId> {
        self.list_instances(table)
            .into_iter()
            .find(|&id| self.nodes[id.0].key.as_deref() == Some(key))
    }

    /// Detaches the list instance of `table` with key `key`.
    pub fn remove_instance(&mut self, table: &str, key: &str) -> bool {
        let Some(container) = self.table_container(table) else {
            return false;
        };
        match self.find_instance(table, key) {
            Some(id) => self.detach(Some(container), id),
            None => false,
        }
    }

    /// Values of leaf or leaf-list `field` directly under `instance`
    pub fn leaf_values(&self, instance: NodeId, field: &str) -> Vec<&str> {
        self.nodes[instance.0]
            .children
            .iter()
            .map(|&c| &self.nodes[c.0])
            .filter(|n| n.name == field && matches!(n.kind, NodeKind::Leaf | NodeKind::LeafList))
            .filter_map(|n| n.value.as_deref())
            .collect()
    }

    /// Whether any instance of `table` has `value` in leaf `field`
    pub fn contains_value(&self, table: &str, field: &str, value: &str) -> bool {
        self.list_instances(table)
            .into_iter()
            .any(|id| self.leaf_values(id, field).contains(&value))
    }

    /// Number of nodes reachable from the roots
    pub fn node_count(&self) -> usize {
        fn count(doc: &Document, id: NodeId) -> usize {
            1 + doc.nodes[id.0].children.iter().map(|&c| count(doc, c)).sum::<usize>()
        }
        self.roots.iter().map(|&r| count(self, r)).sum()
    }

    fn subtree_eq(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        let (na, nb) = (&self.nodes[a.0], &other.nodes[b.0]);
        na.name == nb.name
            && na.kind == nb.kind
            && na.key == nb.key
            && na.value == nb.value
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(nb.children.iter())
                .all(|(&ca, &cb)| self.subtree_eq(ca, other, cb))
    }

    /// Renders the document as JSON: lists and leaf-lists become arrays,
    /// list instances become objects of their leaves.
    pub fn to_json(&self) -> Value {
        self.children_json(&self.roots)
    }

    fn children_json(&self, children: &[NodeId]) -> Value {
        let mut grouped: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
        for &c in children {
            grouped.entry(self.nodes[c.0].name.as_str()).or_default().push(c);
        }

        let mut map = Map::new();
        for (name, ids) in grouped {
            let repeated = ids
                .iter()
                .any(|&id| matches!(self.nodes[id.0].kind, NodeKind::List | NodeKind::LeafList));
            let mut rendered: Vec<Value> = ids.iter().map(|&id| self.node_json(id)).collect();
            let value = if repeated || rendered.len() > 1 {
                Value::Array(rendered)
            } else {
                rendered.pop().unwrap_or(Value::Null)
            };
            map.insert(name.to_string(), value);
        }
        Value::Object(map)
    }

    fn node_json(&self, id: NodeId) -> Value {
        let node = &self.nodes[id.0];
        match node.kind {
            NodeKind::Leaf | NodeKind::LeafList => {
                node.value.clone().map(Value::String).unwrap_or(Value::Null)
            }
            _ => self.children_json(&node.children),
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.roots.len() == other.roots.len()
            && self
                .roots
                .iter()
                .zip(other.roots.iter())
                .all(|(&a, &b)| self.subtree_eq(a, other, b))
    }
}

impl Eq for Document {}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
