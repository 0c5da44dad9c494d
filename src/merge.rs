//! Tree merge
//!
//! Combines two independently built documents into one. The source is
//! consumed: each of its nodes is either moved into the destination or
//! dropped, never duplicated.
//!
//! Matching rules:
//! - nodes match when their tags are equal
//! - list instances additionally need an identical key attribute
//! - leaf-list members are never matched one by one: all members of a field
//!   in the destination are removed, then every member from the source is
//!   inserted where the first removed one was (replace, not union)
//! - matched leaves take the source value, matched inner nodes recurse
//! - unmatched source subtrees are reparented under the deepest matching
//!   destination ancestor, or become new top-level nodes
//!
//! Merging the same source twice is a no-op the second time.

use crate::document::{Document, NodeId, NodeKind};

/// Merges `src` into `dest` and returns the result.
pub fn merge(mut dest: Document, src: Document) -> Document {
    dest.merge_from(src);
    dest
}

impl Document {
    /// Merges `src` into this document in place.
    pub fn merge_from(&mut self, mut src: Document) {
        let roots = src.take_roots();
        merge_children(self, None, &mut src, roots);
    }
}

fn merge_children(
    dest: &mut Document,
    dest_parent: Option<NodeId>,
    src: &mut Document,
    src_children: Vec<NodeId>,
) {
    let mut leaf_lists: Vec<(String, Vec<NodeId>)> = Vec::new();
    let mut others = Vec::new();
    for child in src_children {
        let node = src.node(child);
        if node.kind() == NodeKind::LeafList {
            match leaf_lists.iter_mut().find(|(name, _)| name == node.name()) {
                Some((_, members)) => members.push(child),
                None => leaf_lists.push((node.name().to_string(), vec![child])),
            }
        } else {
            others.push(child);
        }
    }

    for (name, members) in leaf_lists {
        let position = dest
            .remove_leaf_list(dest_parent, &name)
            .unwrap_or_else(|| dest.children(dest_parent).len());
        for (offset, member) in members.into_iter().enumerate() {
            let moved = dest.adopt(src, member);
            dest.insert_child(dest_parent, position + offset, moved);
        }
    }

    for child in others {
        match dest.find_matching(dest_parent, src.node(child)) {
            Some(target) => {
                if src.node(child).kind() == NodeKind::Leaf {
                    let value = src.node(child).value().map(str::to_string);
                    dest.set_value(target, value);
                } else {
                    let grandchildren = src.node(child).children().to_vec();
                    merge_children(dest, Some(target), src, grandchildren);
                }
            }
            None => {
                let moved = dest.adopt(src, child);
                let end = dest.children(dest_parent).len();
                dest.insert_child(dest_parent, end, moved);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn port(instances: Vec<(&str, Vec<(&str, &str)>, Vec<&str>)>) -> Document {
        let mut doc = Document::new();
        let module = doc.add_root("sonic-port", NodeKind::Module);
        let table = doc.add_child(module, "PORT", NodeKind::Container);
        for (key, leaves, lanes) in instances {
            let inst = doc.add_list_instance(table, "PORT_LIST", key);
            doc.add_leaf(inst, "name", key);
            for (name, value) in leaves {
                doc.add_leaf(inst, name, value);
            }
            for lane in lanes {
                doc.add_leaf_list_item(inst, "lanes", lane);
            }
        }
        doc
    }

    #[test]
    fn test_matching_leaf_takes_source_value() {
        let dest = port(vec![("Ethernet0", vec![("mtu", "1500")], vec![])]);
        let src = port(vec![("Ethernet0", vec![("mtu", "9100")], vec![])]);
        let merged = merge(dest, src);
        assert_eq!(merged, port(vec![("Ethernet0", vec![("mtu", "9100")], vec![])]));
    }

    #[test]
    fn test_list_instances_match_on_key() {
        let dest = port(vec![("Ethernet0", vec![("mtu", "1500")], vec![])]);
        let src = port(vec![("Ethernet4", vec![("mtu", "9100")], vec![])]);
        let merged = merge(dest, src);
        assert_eq!(merged.list_instances("PORT").len(), 2);
        let e4 = merged.find_instance("PORT", "Ethernet4").unwrap();
        assert_eq!(merged.leaf_values(e4, "mtu"), vec!["9100"]);
    }

    #[test]
    fn test_leaf_list_replace_not_union() {
        let dest = port(vec![("Ethernet0", vec![], vec!["0", "1", "2", "3"])]);
        let src = port(vec![("Ethernet0", vec![], vec!["4", "5"])]);
        let merged = merge(dest, src);
        let inst = merged.find_instance("PORT", "Ethernet0").unwrap();
        assert_eq!(merged.leaf_values(inst, "lanes"), vec!["4", "5"]);
    }

    #[test]
    fn test_leaf_list_keeps_position() {
        let mut dest = port(vec![("Ethernet0", vec![], vec!["0", "1"])]);
        let inst = dest.find_instance("PORT", "Ethernet0").unwrap();
        dest.add_leaf(inst, "mtu", "1500");
        let src = port(vec![("Ethernet0", vec![], vec!["7"])]);
        let merged = merge(dest, src);

        let inst = merged.find_instance("PORT", "Ethernet0").unwrap();
        let names: Vec<&str> = merged
            .children(Some(inst))
            .iter()
            .map(|&c| merged.node(c).name())
            .collect();
        assert_eq!(names, vec!["name", "lanes", "mtu"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = port(vec![("Ethernet0", vec![("mtu", "1500")], vec!["0", "1"])]);
        let b = port(vec![
            ("Ethernet0", vec![("speed", "100000")], vec!["2"]),
            ("Ethernet4", vec![("mtu", "9100")], vec!["4", "5"]),
        ]);
        let once = merge(a, b.clone());
        let twice = merge(once.clone(), b);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unmatched_module_becomes_top_level() {
        let dest = port(vec![("Ethernet0", vec![], vec![])]);
        let mut src = Document::new();
        let module = src.add_root("sonic-vlan", NodeKind::Module);
        let table = src.add_child(module, "VLAN", NodeKind::Container);
        let inst = src.add_list_instance(table, "VLAN_LIST", "Vlan10");
        src.add_leaf(inst, "name", "Vlan10");

        let merged = merge(dest, src);
        assert_eq!(merged.roots().len(), 2);
        assert_eq!(
            merged.to_json()["sonic-vlan"],
            json!({"VLAN": {"VLAN_LIST": [{"name": "Vlan10"}]}})
        );
    }

    #[test]
    fn test_source_nodes_are_moved_not_copied() {
        let dest = port(vec![("Ethernet0", vec![("mtu", "1500")], vec![])]);
        let src = port(vec![("Ethernet0", vec![("mtu", "9100")], vec![]), ("Ethernet4", vec![], vec![])]);
        let merged = merge(dest, src);
        // module, container, 2 instances, 2 names, 1 mtu
        assert_eq!(merged.node_count(), 7);
    }
}
