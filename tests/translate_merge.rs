//! Translation and Merge Property Tests
//!
//! - Rows survive translate + read-back unchanged
//! - Repeating key components expand to their Cartesian product
//! - Merge is idempotent
//! - Leaf-lists are replaced on merge, never unioned

use cvl::merge::merge;
use cvl::schema::{FieldDef, SchemaIndex, SchemaModule, TableDef};
use cvl::translate::{rows_from_document, translate, FieldMap, TableRows};

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> SchemaIndex {
    SchemaIndex::build(vec![
        SchemaModule::new(
            "sonic-port",
            vec![TableDef::new("PORT", "PORT|{name}")
                .field(FieldDef::int("mtu", Some(68), Some(9216)))
                .field(FieldDef::string("lanes").leaf_list())
                .field(FieldDef::enumeration("admin_status", &["up", "down"]))],
        ),
        SchemaModule::new(
            "sonic-queue",
            vec![TableDef::new("QUEUE", "QUEUE|({ports},)*|({queues},)*")
                .field(FieldDef::string("scheduler"))],
        ),
        SchemaModule::new(
            "sonic-vlan",
            vec![TableDef::new("VLAN_MEMBER", "VLAN_MEMBER|{name}|{ifname}")
                .field(FieldDef::enumeration("tagging_mode", &["tagged", "untagged"]))],
        ),
        SchemaModule::new(
            "sonic-dscp-tc-map",
            vec![TableDef::new("DSCP_TO_TC_MAP", "DSCP_TO_TC_MAP|{name}").map_leaf("dscp", "tc")],
        ),
    ])
    .unwrap()
}

fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn rows(table: &str, entries: Vec<(&str, FieldMap)>) -> TableRows {
    let mut rows = TableRows::new();
    let table_rows = rows.entry(table.to_string()).or_default();
    for (key, fields) in entries {
        table_rows.insert(key.to_string(), fields);
    }
    rows
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

/// Every row key and field comes back exactly once.
#[test]
fn test_round_trip_port_rows() {
    let schema = schema();
    let input = rows(
        "PORT",
        vec![
            (
                "Ethernet0",
                fields(&[("admin_status", "up"), ("lanes@", "3,1,2,0"), ("mtu", "9100")]),
            ),
            ("Ethernet4", fields(&[("mtu", "1500")])),
            ("Ethernet8", fields(&[("NULL", "NULL")])),
        ],
    );

    let doc = translate(&schema, &input).unwrap();
    let output = rows_from_document(&schema, &doc).unwrap();
    assert_eq!(output, input);
}

/// Leaf-list members keep their stored order.
#[test]
fn test_round_trip_keeps_leaf_list_order() {
    let schema = schema();
    let input = rows("PORT", vec![("Ethernet0", fields(&[("lanes@", "67,65,66,68")]))]);

    let doc = translate(&schema, &input).unwrap();
    let inst = doc.find_instance("PORT", "Ethernet0").unwrap();
    assert_eq!(doc.leaf_values(inst, "lanes"), vec!["67", "65", "66", "68"]);

    let output = rows_from_document(&schema, &doc).unwrap();
    assert_eq!(output["PORT"]["Ethernet0"]["lanes@"], "67,65,66,68");
}

#[test]
fn test_round_trip_composite_key() {
    let schema = schema();
    let input = rows(
        "VLAN_MEMBER",
        vec![
            ("Vlan10|Ethernet0", fields(&[("tagging_mode", "untagged")])),
            ("Vlan10|Ethernet4", fields(&[("tagging_mode", "tagged")])),
            ("Vlan20|Ethernet0", fields(&[("tagging_mode", "tagged")])),
        ],
    );

    let doc = translate(&schema, &input).unwrap();
    assert_eq!(doc.list_instances("VLAN_MEMBER").len(), 3);
    assert_eq!(rows_from_document(&schema, &doc).unwrap(), input);
}

#[test]
fn test_round_trip_map_leaf_table() {
    let schema = schema();
    let input = rows("DSCP_TO_TC_MAP", vec![("AZURE", fields(&[("0", "1"), ("46", "5"), ("8", "0")]))]);

    let doc = translate(&schema, &input).unwrap();
    assert_eq!(rows_from_document(&schema, &doc).unwrap(), input);
}

#[test]
fn test_hash_reference_is_unwrapped() {
    let schema = schema();
    let input = rows("PORT", vec![("Ethernet0", fields(&[("admin_status", "[PORT_STATUS|up]")]))]);

    let doc = translate(&schema, &input).unwrap();
    let inst = doc.find_instance("PORT", "Ethernet0").unwrap();
    assert_eq!(doc.leaf_values(inst, "admin_status"), vec!["up"]);
}

/// Same input, structurally identical output.
#[test]
fn test_translation_is_deterministic() {
    let schema = schema();
    let input = rows(
        "PORT",
        vec![
            ("Ethernet4", fields(&[("mtu", "1500"), ("lanes@", "4,5")])),
            ("Ethernet0", fields(&[("mtu", "9100")])),
        ],
    );

    let first = translate(&schema, &input).unwrap();
    for _ in 0..10 {
        assert_eq!(translate(&schema, &input).unwrap(), first);
    }
}

// =============================================================================
// Repeating Key Tests
// =============================================================================

/// 2 ports x 3 queues = 6 list instances.
#[test]
fn test_repeating_keys_expand_to_cartesian_product() {
    let schema = schema();
    let input = rows(
        "QUEUE",
        vec![("Ethernet0,Ethernet4|0,1,2", fields(&[("scheduler", "scheduler.0")]))],
    );

    let doc = translate(&schema, &input).unwrap();
    let instances = doc.list_instances("QUEUE");
    assert_eq!(instances.len(), 6);

    let mut keys: Vec<&str> = instances.iter().filter_map(|&i| doc.node(i).key()).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "Ethernet0|0",
            "Ethernet0|1",
            "Ethernet0|2",
            "Ethernet4|0",
            "Ethernet4|1",
            "Ethernet4|2"
        ]
    );

    for &instance in &instances {
        assert_eq!(doc.leaf_values(instance, "scheduler"), vec!["scheduler.0"]);
    }
}

#[test]
fn test_wrong_key_arity_is_rejected() {
    let schema = schema();
    let input = rows("VLAN_MEMBER", vec![("Vlan10", fields(&[("tagging_mode", "tagged")]))]);

    let err = translate(&schema, &input).unwrap_err();
    assert_eq!(err.code(), cvl::CvlErrorCode::SemanticKeyInvalid);
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_is_idempotent() {
    let schema = schema();
    let a = translate(
        &schema,
        &rows("PORT", vec![("Ethernet0", fields(&[("mtu", "1500"), ("lanes@", "0,1")]))]),
    )
    .unwrap();
    let mut b_rows = rows(
        "PORT",
        vec![
            ("Ethernet0", fields(&[("admin_status", "up"), ("lanes@", "2,3")])),
            ("Ethernet4", fields(&[("mtu", "9100")])),
        ],
    );
    b_rows.extend(rows("VLAN_MEMBER", vec![("Vlan10|Ethernet0", fields(&[("tagging_mode", "tagged")]))]));
    let b = translate(&schema, &b_rows).unwrap();

    let once = merge(a, b.clone());
    let twice = merge(once.clone(), b);
    assert_eq!(once, twice);
}

/// k source members replace m destination members: exactly k remain.
#[test]
fn test_merge_replaces_leaf_list() {
    let schema = schema();
    let dest = translate(
        &schema,
        &rows("PORT", vec![("Ethernet0", fields(&[("lanes@", "0,1,2,3"), ("mtu", "9100")]))]),
    )
    .unwrap();
    let src = translate(&schema, &rows("PORT", vec![("Ethernet0", fields(&[("lanes@", "8,9")]))])).unwrap();

    let merged = merge(dest, src);
    let inst = merged.find_instance("PORT", "Ethernet0").unwrap();
    assert_eq!(merged.leaf_values(inst, "lanes"), vec!["8", "9"]);
    assert_eq!(merged.leaf_values(inst, "mtu"), vec!["9100"]);
}

#[test]
fn test_merge_of_translated_rows_equals_translation_of_union() {
    let schema = schema();
    let left = rows("PORT", vec![("Ethernet0", fields(&[("mtu", "1500")]))]);
    let right = rows("PORT", vec![("Ethernet4", fields(&[("mtu", "9100")]))]);

    let merged = merge(translate(&schema, &left).unwrap(), translate(&schema, &right).unwrap());

    let union = rows(
        "PORT",
        vec![
            ("Ethernet0", fields(&[("mtu", "1500")])),
            ("Ethernet4", fields(&[("mtu", "9100")])),
        ],
    );
    assert_eq!(rows_from_document(&schema, &merged).unwrap(), union);
}
