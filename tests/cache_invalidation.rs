//! Global Cache Invalidation Tests
//!
//! - A keyspace notification updates only the affected key
//! - The background listener follows store writes
//! - Validated edits fold into cached tables
//! - Shutdown releases the store subscription

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use cvl::cache::{CacheStats, GlobalCache};
use cvl::schema::{FieldDef, SchemaIndex, SchemaModule, TableDef};
use cvl::store::{KeyspaceNotification, KeyspaceOp, MemoryStore};
use cvl::translate::FieldMap;
use cvl::{EditItem, Engine, EngineConfig};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn schema() -> Arc<SchemaIndex> {
    Arc::new(
        SchemaIndex::build(vec![
            SchemaModule::new(
                "sonic-port",
                vec![TableDef::new("PORT", "PORT|{name}")
                    .field(FieldDef::int("mtu", Some(68), Some(9216)))
                    .field(FieldDef::string("lanes").leaf_list())],
            ),
            SchemaModule::new(
                "sonic-vlan",
                vec![TableDef::new("VLAN", "VLAN|{name}").field(FieldDef::int("vlanid", Some(1), Some(4094)))],
            ),
        ])
        .unwrap(),
    )
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(4));
    store
        .load_json(&json!({
            "PORT|Ethernet0": {"mtu": "9100", "lanes@": "0,1,2,3"},
            "PORT|Ethernet4": {"mtu": "9100", "lanes@": "4,5,6,7"},
            "VLAN|Vlan10": {"vlanid": "10"}
        }))
        .unwrap();
    store
}

fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

async fn mtu_of(cache: &GlobalCache, port: &str) -> Option<String> {
    let doc = cache.get("PORT").await.unwrap().unwrap();
    let inst = doc.find_instance("PORT", port)?;
    doc.leaf_values(inst, "mtu").first().map(|v| v.to_string())
}

async fn wait_for(cache: &GlobalCache, done: impl Fn(&CacheStats) -> bool) {
    for _ in 0..200 {
        if done(&cache.stats().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache did not reach the expected state: {:?}", cache.stats().await);
}

async fn wait_for_subscription(store: &MemoryStore, expected: usize) {
    for _ in 0..200 {
        if store.subscriber_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} subscriber(s), found {}", expected, store.subscriber_count());
}

// =============================================================================
// Incremental Update Tests
// =============================================================================

/// A field-set notification refetches exactly the notified key.
#[tokio::test]
async fn test_field_set_updates_single_key() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();

    let ethernet4_before = {
        let doc = cache.get("PORT").await.unwrap().unwrap();
        let inst = doc.find_instance("PORT", "Ethernet4").unwrap();
        doc.leaf_values(inst, "lanes").iter().map(|v| v.to_string()).collect::<Vec<_>>()
    };
    let before = store.stats();

    // Written without publishing so only the simulated notification applies
    store
        .load([("PORT|Ethernet0".to_string(), fields(&[("mtu", "1500"), ("lanes@", "0,1,2,3")]))].into())
        .unwrap();
    let applied = cache
        .apply_notification(&KeyspaceNotification::for_key(4, "PORT|Ethernet0", KeyspaceOp::FieldSet))
        .await
        .unwrap();
    assert!(applied);

    let after = store.stats();
    assert_eq!(after.rows_fetched, before.rows_fetched + 1);
    assert_eq!(after.key_scans, before.key_scans);

    assert_eq!(mtu_of(&cache, "Ethernet0").await.as_deref(), Some("1500"));
    assert_eq!(mtu_of(&cache, "Ethernet4").await.as_deref(), Some("9100"));

    let doc = cache.get("PORT").await.unwrap().unwrap();
    let inst = doc.find_instance("PORT", "Ethernet4").unwrap();
    assert_eq!(doc.leaf_values(inst, "lanes"), ethernet4_before);
    assert_eq!(doc.list_instances("PORT").len(), 2);

    let stats = cache.stats().await;
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.incremental_updates, 1);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_key_delete_notification_removes_instance() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();

    let before = store.stats();
    let applied = cache
        .apply_notification(&KeyspaceNotification::for_key(4, "PORT|Ethernet4", KeyspaceOp::KeyDelete))
        .await
        .unwrap();
    assert!(applied);
    // Nothing to fetch for a removed key
    assert_eq!(store.stats().rows_fetched, before.rows_fetched);

    assert_eq!(mtu_of(&cache, "Ethernet4").await, None);
    assert_eq!(mtu_of(&cache, "Ethernet0").await.as_deref(), Some("9100"));
    cache.shutdown().await;
}

/// Replacing the same row over and over does not grow the arena.
#[tokio::test]
async fn test_repeated_updates_keep_document_compact() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();

    for mtu in 1000..2000 {
        store
            .load([("PORT|Ethernet0".to_string(), fields(&[("mtu", &mtu.to_string()), ("lanes@", "0,1,2,3")]))].into())
            .unwrap();
        cache
            .apply_notification(&KeyspaceNotification::for_key(4, "PORT|Ethernet0", KeyspaceOp::FieldSet))
            .await
            .unwrap();
    }

    let doc = cache.get("PORT").await.unwrap().unwrap();
    assert!(doc.slot_count() <= 2 * doc.node_count(), "{} slots for {} nodes", doc.slot_count(), doc.node_count());
    assert_eq!(mtu_of(&cache, "Ethernet0").await.as_deref(), Some("1999"));
    assert_eq!(doc.list_instances("PORT").len(), 2);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_notification_for_uncached_table_is_ignored() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();

    let applied = cache
        .apply_notification(&KeyspaceNotification::for_key(4, "VLAN|Vlan10", KeyspaceOp::FieldSet))
        .await
        .unwrap();
    assert!(!applied);
    assert_eq!(cache.stats().await.incremental_updates, 0);
    cache.shutdown().await;
}

/// Readers holding a document keep their snapshot.
#[tokio::test]
async fn test_readers_keep_snapshot() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();

    let snapshot = cache.get("PORT").await.unwrap().unwrap();
    store
        .load([("PORT|Ethernet0".to_string(), fields(&[("mtu", "1500")]))].into())
        .unwrap();
    cache
        .apply_notification(&KeyspaceNotification::for_key(4, "PORT|Ethernet0", KeyspaceOp::FieldSet))
        .await
        .unwrap();

    let inst = snapshot.find_instance("PORT", "Ethernet0").unwrap();
    assert_eq!(snapshot.leaf_values(inst, "mtu"), vec!["9100"]);
    assert_eq!(mtu_of(&cache, "Ethernet0").await.as_deref(), Some("1500"));
    cache.shutdown().await;
}

// =============================================================================
// Listener Tests
// =============================================================================

#[tokio::test]
async fn test_listener_follows_store_writes() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();
    wait_for_subscription(&store, 1).await;

    store.hset("PORT|Ethernet4", fields(&[("mtu", "1500")])).unwrap();
    wait_for(&cache, |s| s.incremental_updates >= 1).await;
    assert_eq!(mtu_of(&cache, "Ethernet4").await.as_deref(), Some("1500"));

    store.del("PORT|Ethernet4").unwrap();
    wait_for(&cache, |s| s.incremental_updates >= 2).await;
    assert_eq!(mtu_of(&cache, "Ethernet4").await, None);

    // Writes to uncached tables are not applied
    store.hset("VLAN|Vlan20", fields(&[("vlanid", "20")])).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.stats().await.incremental_updates, 2);

    cache.shutdown().await;
}

/// `set` returns only once the subscription covers the table.
#[tokio::test]
async fn test_write_right_after_set_is_applied() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();
    assert_eq!(store.subscriber_count(), 1);

    store.hset("PORT|Ethernet0", fields(&[("mtu", "1500")])).unwrap();
    wait_for(&cache, |s| s.incremental_updates >= 1).await;
    assert_eq!(mtu_of(&cache, "Ethernet0").await.as_deref(), Some("1500"));
    cache.shutdown().await;
}

#[tokio::test]
async fn test_subscription_follows_cached_tables() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();
    cache.set("VLAN", 0).await.unwrap();
    wait_for_subscription(&store, 1).await;

    assert!(cache.remove("VLAN").await);
    assert_eq!(cache.tables().await, vec!["PORT".to_string()]);
    // Let the listener swap to the narrower subscription
    tokio::time::sleep(Duration::from_millis(50)).await;
    wait_for_subscription(&store, 1).await;

    store.hset("VLAN|Vlan10", fields(&[("vlanid", "11")])).unwrap();
    store.hset("PORT|Ethernet0", fields(&[("mtu", "1500")])).unwrap();
    wait_for(&cache, |s| s.incremental_updates >= 1).await;
    assert_eq!(cache.stats().await.incremental_updates, 1);

    cache.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_releases_subscription() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();
    wait_for_subscription(&store, 1).await;

    cache.shutdown().await;
    assert_eq!(store.subscriber_count(), 0);
}

// =============================================================================
// Expiry and Invalidation Tests
// =============================================================================

#[tokio::test]
async fn test_invalidate_rebuilds_on_next_read() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 0).await.unwrap();

    store
        .load([("PORT|Ethernet8".to_string(), fields(&[("mtu", "9100")]))].into())
        .unwrap();
    assert!(cache.invalidate("PORT").await);

    let doc = cache.get("PORT").await.unwrap().unwrap();
    assert_eq!(doc.list_instances("PORT").len(), 3);

    let stats = cache.stats().await;
    assert_eq!(stats.builds, 2);
    assert_eq!(stats.misses, 1);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_entry_expiry() {
    let store = seeded_store();
    let cache = GlobalCache::new(schema(), store.clone(), 4, 100);
    cache.set("PORT", 30).await.unwrap();
    cache.set("VLAN", 0).await.unwrap();

    let port = cache.entry("PORT").await.unwrap();
    assert!(!port.is_expired(port.created_at()));
    assert!(port.is_expired(port.created_at() + ChronoDuration::seconds(31)));

    let vlan = cache.entry("VLAN").await.unwrap();
    assert!(!vlan.is_expired(vlan.created_at() + ChronoDuration::days(365)));
    cache.shutdown().await;
}

// =============================================================================
// Session Fold Tests
// =============================================================================

/// Accepted edits on a cached table show up in the cached document.
#[tokio::test]
async fn test_validated_edits_fold_into_cache() {
    let store = seeded_store();
    let config = EngineConfig::new("/unused").cache_table("PORT", 0);
    let processor = Arc::new(cvl::processor::BuiltinProcessor::new(schema()));
    let engine = Engine::from_parts(config, schema(), store.clone(), processor).await.unwrap();
    assert_eq!(engine.cache().tables().await, vec!["PORT".to_string()]);

    let mut session = engine.open_session();
    session
        .validate(&[
            EditItem::create("PORT|Ethernet8").field("mtu", "9000"),
            EditItem::update("PORT|Ethernet0").field("mtu", "1500"),
        ])
        .await
        .unwrap();

    let cache = engine.cache();
    assert_eq!(mtu_of(cache, "Ethernet8").await.as_deref(), Some("9000"));
    assert_eq!(mtu_of(cache, "Ethernet0").await.as_deref(), Some("1500"));
    assert_eq!(cache.stats().await.folds, 2);

    session.validate(&[EditItem::delete("PORT|Ethernet8")]).await.unwrap();
    assert_eq!(mtu_of(cache, "Ethernet8").await, None);

    // The store itself is never written
    assert!(store.get("PORT|Ethernet8").is_none());
    engine.shutdown().await;
}
