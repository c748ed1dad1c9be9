//! Snapshot integration tests.

use std::sync::Arc;
use std::time::Duration;

use nebucloud_informer::prelude::*;
use serde_json::json;

use crate::support::{deployment, eventually, fast_relist};

fn obj(name: &str, version: u64) -> Object {
    Object::new(ResourceKey::namespaced("default", name), json!({})).with_version(version)
}

#[test]
fn snapshot_of_empty_cache() {
    let snapshot = LocalCache::new().snapshot();

    assert!(snapshot.is_empty());
    assert_eq!(snapshot.len(), 0);
    assert!(snapshot.version().is_empty());
}

#[test]
fn snapshot_keys_are_sorted() {
    let cache = LocalCache::new();
    for (name, version) in [("c", 1), ("a", 2), ("b", 3)] {
        cache.apply_event(&ChangeEvent::Added(obj(name, version)));
    }

    let snapshot = cache.snapshot();
    let names: Vec<String> = snapshot.keys().iter().map(|k| k.to_string()).collect();
    assert_eq!(names, vec!["default/a", "default/b", "default/c"]);

    let versions: Vec<String> = snapshot
        .objects()
        .iter()
        .map(|o| o.version().to_string())
        .collect();
    assert_eq!(versions, vec!["2", "3", "1"]);
    assert_eq!(snapshot.version().as_str(), "3");
}

#[test]
fn snapshot_is_unaffected_by_later_changes() {
    let cache = LocalCache::new();
    cache.apply_event(&ChangeEvent::Added(obj("a", 1)));
    cache.apply_event(&ChangeEvent::Added(obj("b", 2)));

    let before = cache.snapshot();

    cache.apply_event(&ChangeEvent::Modified(obj("a", 3)));
    cache.apply_event(&ChangeEvent::Deleted(obj("b", 4)));
    cache.replace(vec![obj("a", 3), obj("z", 5)], ResourceVersion::from(5u64));

    assert_eq!(before.len(), 2);
    assert_eq!(before.version().as_str(), "2");
    let a = ResourceKey::namespaced("default", "a");
    assert_eq!(before.get(&a).unwrap().version().as_str(), "1");
    assert!(before.contains_key(&ResourceKey::namespaced("default", "b")));
    assert!(!before.contains_key(&ResourceKey::namespaced("default", "z")));

    let after = cache.snapshot();
    assert_eq!(after.len(), 2);
    assert_eq!(after.version().as_str(), "5");
    assert_eq!(after.get(&a).unwrap().version().as_str(), "3");
}

#[test]
fn snapshot_shares_objects_with_cache() {
    let cache = LocalCache::new();
    cache.apply_event(&ChangeEvent::Added(obj("a", 1)));

    let key = ResourceKey::namespaced("default", "a");
    let snapshot = cache.snapshot();
    let live = cache.get(&key).unwrap();
    assert!(Arc::ptr_eq(snapshot.get(&key).unwrap().object(), live.object()));
}

#[tokio::test]
async fn synchronizer_snapshot_tracks_store() {
    let store = MemoryStore::new();
    store.create(deployment("a", 1)).await.unwrap();
    store.create(deployment("b", 1)).await.unwrap();

    let sync = Synchronizer::new(Arc::new(store.clone()), fast_relist());
    sync.start(HandlerRegistry::new()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();

    let listed = sync.cache().snapshot();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed.version().as_str(), "2");

    eventually("watch open", || store.watcher_count() == 1).await;
    store
        .delete(
            &ResourceKey::namespaced("default", "a"),
            PropagationPolicy::Background,
        )
        .await
        .unwrap();
    eventually("delete applied", || sync.cache().len() == 1).await;

    assert_eq!(listed.len(), 2);
    let current = sync.cache().snapshot();
    assert_eq!(current.version().as_str(), "3");
    assert_eq!(
        current.keys(),
        vec![ResourceKey::namespaced("default", "b")]
    );

    sync.stop().await;
}
