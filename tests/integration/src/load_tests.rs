//! Load tests for the informer with 1000+ objects.
//!
//! These tests verify the system can handle high load scenarios:
//! - Listing and watching 1000+ objects
//! - Parallel mutations on distinct keys
//! - Mixed read/write cache workloads
//!
//! Run with: `cargo test --package integration-tests load_tests -- --nocapture`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nebucloud_informer::prelude::*;
use serde_json::json;
use tokio::sync::Barrier;

use crate::support::{deployment, eventually, fast_relist, Recorder};

/// Sync 1000 pre-existing objects, then 1000 more through the watch.
#[tokio::test]
async fn test_1000_objects_list_and_watch() {
    let store = MemoryStore::new();
    let num_objects = 1000;

    for i in 0..num_objects {
        store.create(deployment(&format!("listed-{}", i), 1)).await.unwrap();
    }

    let recorder = Recorder::new();
    let sync = Synchronizer::new(Arc::new(store.clone()), fast_relist());

    let start = Instant::now();
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(10)).await.unwrap();
    let list_duration = start.elapsed();
    println!(
        "Listed {} objects in {:?} ({:.2} µs/op)",
        num_objects,
        list_duration,
        list_duration.as_micros() as f64 / num_objects as f64
    );
    assert_eq!(sync.cache().len(), num_objects);

    eventually("watch open", || store.watcher_count() == 1).await;
    let start = Instant::now();
    for i in 0..num_objects {
        store.create(deployment(&format!("watched-{}", i), 1)).await.unwrap();
    }
    eventually("watch caught up", || sync.cache().len() == 2 * num_objects).await;
    let watch_duration = start.elapsed();
    println!(
        "Applied {} watch events in {:?} ({:.2} µs/op)",
        num_objects,
        watch_duration,
        watch_duration.as_micros() as f64 / num_objects as f64
    );

    assert_eq!(recorder.len(), 2 * num_objects);
    assert_eq!(
        sync.last_synced_version().unwrap(),
        ResourceVersion::from(num_objects as u64)
    );
    assert_eq!(sync.cache().watermark(), store.revision());

    sync.stop().await;
}

/// Mutate 100 distinct keys concurrently, 10 times each.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_distinct_keys() {
    let store = MemoryStore::new();
    let num_keys = 100;
    let rounds = 10;

    for i in 0..num_keys {
        store.create(deployment(&format!("app-{}", i), 0)).await.unwrap();
    }

    let barrier = Arc::new(Barrier::new(num_keys));
    let mutator = Mutator::new(Arc::new(store.clone()));
    let conflicts = Arc::new(AtomicU64::new(0));

    let start = Instant::now();
    let mut handles = Vec::with_capacity(num_keys);
    for i in 0..num_keys {
        let barrier = Arc::clone(&barrier);
        let mutator = mutator.clone();
        let conflicts = Arc::clone(&conflicts);
        handles.push(tokio::spawn(async move {
            let key = ResourceKey::namespaced("default", format!("app-{}", i));
            barrier.wait().await;
            for _ in 0..rounds {
                let result = mutator
                    .mutate(
                        &key,
                        |obj| {
                            let replicas = obj
                                .get_nested(&["spec", "replicas"])
                                .and_then(|v| v.as_i64())
                                .unwrap_or(0);
                            let mut next = obj.clone();
                            next.set_nested(&["spec", "replicas"], json!(replicas + 1))?;
                            Ok(next)
                        },
                        &RetryPolicy::default_retry(),
                    )
                    .await;
                if result.is_err() {
                    conflicts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    let duration = start.elapsed();
    let total = num_keys * rounds;
    println!(
        "Applied {} mutations in {:?} ({:.2} µs/op)",
        total,
        duration,
        duration.as_micros() as f64 / total as f64
    );

    // Distinct keys never contend
    assert_eq!(conflicts.load(Ordering::Relaxed), 0);
    for i in 0..num_keys {
        let obj = store
            .get(&ResourceKey::namespaced("default", format!("app-{}", i)))
            .await
            .unwrap();
        assert_eq!(obj.get_nested(&["spec", "replicas"]), Some(&json!(rounds)));
    }
    assert_eq!(
        store.revision(),
        ResourceVersion::from((num_keys + total) as u64)
    );
}

/// Mixed read/write workload on the cache.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_workload_1000_objects() {
    let cache = Arc::new(LocalCache::with_capacity(1000));
    let num_objects = 1000u64;

    let keys: Vec<ResourceKey> = (0..num_objects)
        .map(|i| ResourceKey::namespaced(format!("ns-{}", i % 10), format!("obj-{}", i)))
        .collect();

    let start = Instant::now();
    for (i, key) in keys.iter().enumerate() {
        let obj = Object::new(key.clone(), json!({})).with_version(i as u64 + 1);
        cache.apply_event(&ChangeEvent::Added(obj));
    }
    let write_duration = start.elapsed();

    let reads = Arc::new(AtomicU64::new(0));
    let start = Instant::now();
    let mut handles = vec![];
    for t in 0..8 {
        let cache = Arc::clone(&cache);
        let keys = keys.clone();
        let reads = Arc::clone(&reads);
        handles.push(tokio::spawn(async move {
            for (i, key) in keys.iter().enumerate() {
                if i % 8 == t {
                    assert!(cache.get(key).is_some());
                    reads.fetch_add(1, Ordering::Relaxed);
                }
            }
            cache.by_namespace(&format!("ns-{}", t)).len()
        }));
    }

    let mut namespaced = 0;
    for handle in handles {
        namespaced += handle.await.unwrap();
    }
    let read_duration = start.elapsed();

    println!(
        "Wrote {} entries in {:?} ({:.2} µs/op)",
        num_objects,
        write_duration,
        write_duration.as_micros() as f64 / num_objects as f64
    );
    println!(
        "Read {} entries in {:?} ({:.2} µs/op)",
        reads.load(Ordering::Relaxed),
        read_duration,
        read_duration.as_micros() as f64 / num_objects as f64
    );
    println!("Cache hit rate: {:.2}%", cache.stats().hit_rate() * 100.0);

    assert_eq!(reads.load(Ordering::Relaxed), num_objects);
    assert_eq!(namespaced, 800);
    assert_eq!(cache.stats().misses(), 0);

    let start = Instant::now();
    let snapshot = cache.snapshot();
    println!(
        "Snapshot of {} entries in {:?}",
        snapshot.len(),
        start.elapsed()
    );
    assert_eq!(snapshot.len(), num_objects as usize);
}

/// Relist of 5000 objects where half changed while the watch was down.
#[tokio::test]
async fn test_5000_objects_relist() {
    let cache = LocalCache::new();
    let num_objects = 5000u64;

    let initial: Vec<Object> = (0..num_objects)
        .map(|i| {
            Object::new(ResourceKey::namespaced("default", format!("obj-{}", i)), json!({}))
                .with_version(i + 1)
        })
        .collect();
    let added = cache.replace(initial.clone(), ResourceVersion::from(num_objects));
    assert_eq!(added.len(), num_objects as usize);

    // even indices bumped, the last 100 gone
    let relisted: Vec<Object> = initial
        .into_iter()
        .take((num_objects - 100) as usize)
        .enumerate()
        .map(|(i, obj)| {
            if i % 2 == 0 {
                obj.with_version(num_objects + i as u64 + 1)
            } else {
                obj
            }
        })
        .collect();

    let start = Instant::now();
    let deltas = cache.replace(relisted, ResourceVersion::from(3 * num_objects));
    let duration = start.elapsed();
    println!(
        "Relisted {} objects in {:?} ({} deltas)",
        num_objects,
        duration,
        deltas.len()
    );

    let modified = deltas.iter().filter(|d| d.kind == ChangeKind::Modified).count();
    let deleted = deltas.iter().filter(|d| d.kind == ChangeKind::Deleted).count();
    assert_eq!(modified, 2450);
    assert_eq!(deleted, 100);
    assert_eq!(cache.len(), 4900);
}
