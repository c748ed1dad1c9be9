//! Cache integration tests.

use std::sync::Arc;

use nebucloud_informer::prelude::*;
use serde_json::json;

fn obj(name: &str, version: u64) -> Object {
    Object::new(ResourceKey::namespaced("default", name), json!({"n": version}))
        .with_version(version)
}

#[test]
fn cache_basic_operations() {
    let cache = LocalCache::new();
    let key = ResourceKey::namespaced("default", "web");

    let delta = cache.apply_event(&ChangeEvent::Added(obj("web", 1))).unwrap();
    assert_eq!(delta.kind, ChangeKind::Added);
    assert!(delta.previous.is_none());

    let retrieved = cache.get(&key).expect("entry should exist");
    assert_eq!(retrieved.version().as_str(), "1");
    assert_eq!(cache.watermark().as_str(), "1");

    let delta = cache
        .apply_event(&ChangeEvent::Modified(obj("web", 2)))
        .unwrap();
    assert_eq!(delta.kind, ChangeKind::Modified);
    assert_eq!(delta.previous.unwrap().version().as_str(), "1");
}

#[test]
fn cache_ignores_stale_and_replayed_events() {
    let cache = LocalCache::new();
    cache.apply_event(&ChangeEvent::Added(obj("web", 5)));

    assert!(cache.apply_event(&ChangeEvent::Modified(obj("web", 3))).is_none());
    assert!(cache.apply_event(&ChangeEvent::Modified(obj("web", 5))).is_none());

    let key = ResourceKey::namespaced("default", "web");
    assert_eq!(cache.get(&key).unwrap().version().as_str(), "5");
    assert_eq!(cache.stats().stale_skipped(), 1);
    assert_eq!(cache.stats().replays_skipped(), 1);
}

#[test]
fn cache_stats_tracking() {
    let cache = LocalCache::new();
    let key = ResourceKey::namespaced("default", "web");

    // Record miss
    cache.get(&key);
    assert_eq!(cache.stats().misses(), 1);
    assert_eq!(cache.stats().hits(), 0);

    // Apply and hit
    cache.apply_event(&ChangeEvent::Added(obj("web", 1)));
    cache.get(&key);

    assert_eq!(cache.stats().events_applied(), 1);
    assert_eq!(cache.stats().hits(), 1);
    assert_eq!(cache.stats().misses(), 1);

    // Hit rate should be 0.5
    assert!((cache.stats().hit_rate() - 0.5).abs() < 0.01);
}

#[test]
fn relist_deletion_is_reported_once() {
    let cache = LocalCache::new();
    for (name, version) in [("a", 1), ("b", 2), ("c", 3)] {
        cache.apply_event(&ChangeEvent::Added(obj(name, version)));
    }

    let deltas = cache.replace(vec![obj("a", 1), obj("c", 3)], ResourceVersion::from(4u64));
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].kind, ChangeKind::Deleted);
    assert_eq!(deltas[0].key(), &ResourceKey::namespaced("default", "b"));

    // the late watch event for the same delete is absorbed
    assert!(cache.apply_event(&ChangeEvent::Deleted(obj("b", 4))).is_none());
    assert_eq!(cache.stats().deletes(), 1);
    assert_eq!(cache.len(), 2);
}

#[test]
fn bookmarks_advance_watermark_only() {
    let cache = LocalCache::new();
    cache.apply_event(&ChangeEvent::Added(obj("web", 1)));

    assert!(cache
        .apply_event(&ChangeEvent::Bookmark(ResourceVersion::from(9u64)))
        .is_none());
    assert_eq!(cache.watermark().as_str(), "9");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().bookmarks(), 1);
}

#[test]
fn cache_namespace_view() {
    let cache = LocalCache::new();
    cache.apply_event(&ChangeEvent::Added(obj("web", 1)));
    cache.apply_event(&ChangeEvent::Added(
        Object::new(ResourceKey::namespaced("kube-system", "dns"), json!({})).with_version(2u64),
    ));
    cache.apply_event(&ChangeEvent::Added(
        Object::new(ResourceKey::cluster_scoped("node-1"), json!({})).with_version(3u64),
    ));

    assert_eq!(cache.by_namespace("default").len(), 1);
    assert_eq!(cache.by_namespace("kube-system").len(), 1);
    assert_eq!(cache.len(), 3);

    assert_eq!(cache.clear(), 3);
    assert!(cache.is_empty());
}

#[test]
fn cache_concurrent_access() {
    use std::thread;

    let cache = Arc::new(LocalCache::new());
    let writer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            for version in 1..=500u64 {
                cache.apply_event(&ChangeEvent::Modified(obj("hot", version)));
            }
        })
    };

    // Readers only ever see whole entries with monotonic versions
    let mut readers = vec![];
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        readers.push(thread::spawn(move || {
            let key = ResourceKey::namespaced("default", "hot");
            let mut last = 0u64;
            for _ in 0..1000 {
                if let Some(entry) = cache.get(&key) {
                    let version: u64 = entry.version().as_str().parse().unwrap();
                    assert!(version >= last);
                    assert_eq!(entry.object().get_nested(&["n"]), Some(&json!(version)));
                    last = version;
                }
            }
        }));
    }

    writer.join().unwrap();
    for handle in readers {
        handle.join().unwrap();
    }

    let key = ResourceKey::namespaced("default", "hot");
    assert_eq!(cache.get(&key).unwrap().version().as_str(), "500");
}
