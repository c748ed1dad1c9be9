//! Synchronizer scenarios: recovery, ordering, isolation, shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nebucloud_informer::prelude::*;
use serde_json::json;

use crate::support::{deployment, eventually, fast_relist, PartitionedStore, Recorder};

#[tokio::test]
async fn expired_stream_forces_relist_and_reports_missed_deletes() {
    let store = MemoryStore::new();
    for name in ["a", "b", "c", "d", "e"] {
        store.create(deployment(name, 1)).await.unwrap();
    }
    assert_eq!(store.revision().as_str(), "5");

    let partitioned = PartitionedStore::new(store.clone());
    let recorder = Recorder::new();
    let sync = Synchronizer::new(partitioned.clone(), fast_relist());
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();
    eventually("watch open", || store.watcher_count() == 1).await;
    assert_eq!(store.last_watch_from().unwrap().as_str(), "5");

    // the watch misses these deletes
    partitioned.partition(true);
    for name in ["b", "d"] {
        store
            .delete(
                &ResourceKey::namespaced("default", name),
                PropagationPolicy::Background,
            )
            .await
            .unwrap();
    }
    store.compact();
    partitioned.partition(false);
    store.expire_watchers();

    eventually("relist", || sync.cache().len() == 3).await;
    eventually("rewatch", || store.watcher_count() == 1).await;

    assert_eq!(store.list_calls(), 2);
    // resumed from the new list, not from 5
    assert_eq!(store.last_watch_from().unwrap().as_str(), "7");
    assert_eq!(sync.last_synced_version().unwrap().as_str(), "7");

    let deleted: Vec<String> = recorder
        .of_kind(ChangeKind::Deleted)
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert_eq!(deleted, vec!["default/b".to_string(), "default/d".to_string()]);
    // nothing else changed, so nothing else was reported
    assert_eq!(recorder.of_kind(ChangeKind::Added).len(), 5);
    assert!(recorder.of_kind(ChangeKind::Modified).is_empty());

    sync.stop().await;
}

#[tokio::test]
async fn eof_relists_after_backoff_and_catches_up() {
    let store = MemoryStore::new();
    store.create(deployment("a", 1)).await.unwrap();

    let recorder = Recorder::new();
    let sync = Synchronizer::new(Arc::new(store.clone()), fast_relist());
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();
    eventually("watch open", || store.watcher_count() == 1).await;

    store.disconnect_watchers();
    store.create(deployment("b", 1)).await.unwrap();

    eventually("b cached", || {
        sync.cache()
            .contains_key(&ResourceKey::namespaced("default", "b"))
    })
    .await;
    assert!(store.list_calls() >= 2);
    assert_eq!(recorder.of_kind(ChangeKind::Added).len(), 2);

    sync.stop().await;
}

#[tokio::test]
async fn transport_errors_are_absorbed() {
    let store = MemoryStore::new();
    let sync = Synchronizer::new(Arc::new(store.clone()), fast_relist());
    let recorder = Recorder::new();
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();
    eventually("watch open", || store.watcher_count() == 1).await;

    store.fail_next_lists(3);
    store.fail_watchers("connection reset by peer");
    store.create(deployment("late", 1)).await.unwrap();

    eventually("recovered", || recorder.len() == 1).await;
    assert!(store.list_calls() >= 5);
    assert_ne!(sync.state(), SyncState::Stopped);

    sync.stop().await;
}

#[tokio::test]
async fn per_key_order_is_preserved() {
    let store = MemoryStore::new();
    let recorder = Recorder::new();
    let sync = Synchronizer::new(Arc::new(store.clone()), fast_relist());
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();
    eventually("watch open", || store.watcher_count() == 1).await;

    let mut current = store.create(deployment("hot", 0)).await.unwrap();
    for i in 1..=50 {
        let mut next = current.clone();
        next.set_nested(&["spec", "replicas"], json!(i)).unwrap();
        current = store.update(next, current.version()).await.unwrap();
    }

    eventually("all events", || recorder.len() == 51).await;
    let versions: Vec<u64> = recorder
        .seen()
        .iter()
        .map(|s| s.version.parse().unwrap())
        .collect();
    assert!(versions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        sync.cache()
            .get(current.key())
            .unwrap()
            .object()
            .get_nested(&["spec", "replicas"]),
        Some(&json!(50))
    );

    sync.stop().await;
}

#[tokio::test]
async fn failing_handlers_do_not_block_others() {
    let store = MemoryStore::new();
    let recorder = Recorder::new();
    let panics = Arc::new(AtomicUsize::new(0));

    let mut registry = HandlerRegistry::new();
    let counter = Arc::clone(&panics);
    registry.register(
        "panicky",
        Arc::new(HandlerFuncs::new().on_add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("handler bug");
        })),
    );
    registry.register(
        "erroring",
        Arc::new(HandlerFuncs::new().on_add(|obj| Err(format!("rejecting {}", obj.key()).into()))),
    );
    registry.append(recorder.registry());

    let sync = Synchronizer::new(Arc::new(store.clone()), fast_relist());
    sync.start(registry).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();
    eventually("watch open", || store.watcher_count() == 1).await;

    for name in ["a", "b", "c"] {
        store.create(deployment(name, 1)).await.unwrap();
    }

    eventually("all delivered", || recorder.len() == 3).await;
    assert_eq!(panics.load(Ordering::SeqCst), 3);
    assert_eq!(sync.state(), SyncState::Streaming);
    assert_eq!(sync.cache().len(), 3);

    sync.stop().await;
}

#[tokio::test]
async fn stop_halts_notifications_and_network() {
    let store = MemoryStore::new();
    let recorder = Recorder::new();
    let sync = Synchronizer::new(Arc::new(store.clone()), fast_relist());
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();
    eventually("watch open", || store.watcher_count() == 1).await;

    tokio::time::timeout(Duration::from_secs(1), sync.stop())
        .await
        .expect("stop should be prompt");
    assert_eq!(sync.state(), SyncState::Stopped);
    assert_eq!(store.watcher_count(), 0);

    let (lists, watches) = (store.list_calls(), store.watch_calls());
    store.create(deployment("after", 1)).await.unwrap();
    store.expire_watchers();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(recorder.len(), 0);
    assert_eq!(store.list_calls(), lists);
    assert_eq!(store.watch_calls(), watches);
    assert!(sync.cache().is_empty());
}

#[tokio::test]
async fn stop_interrupts_hanging_list() {
    #[derive(Debug)]
    struct HangingStore;

    #[async_trait::async_trait]
    impl RemoteStore for HangingStore {
        async fn list(&self, _: &ListSelector) -> InformerResult<ObjectList> {
            std::future::pending().await
        }
        async fn watch(
            &self,
            _: &ResourceVersion,
            _: &ListSelector,
        ) -> InformerResult<informer_core::WatchStream> {
            std::future::pending().await
        }
        async fn get(&self, key: &ResourceKey) -> InformerResult<Object> {
            Err(InformerError::NotFound { key: key.clone() })
        }
        async fn create(&self, object: Object) -> InformerResult<Object> {
            Ok(object)
        }
        async fn update(&self, object: Object, _: &ResourceVersion) -> InformerResult<Object> {
            Ok(object)
        }
        async fn delete(&self, _: &ResourceKey, _: PropagationPolicy) -> InformerResult<()> {
            Ok(())
        }
    }

    let config = SynchronizerConfig::builder()
        .kind("hanging")
        .no_request_timeout()
        .stop_grace_period(Duration::from_secs(30))
        .build()
        .unwrap();
    let sync = Synchronizer::new(Arc::new(HangingStore), config);
    sync.start(HandlerRegistry::new()).unwrap();
    eventually("listing", || sync.state() == SyncState::Listing).await;

    tokio::time::timeout(Duration::from_secs(1), sync.stop())
        .await
        .expect("stop should cancel the pending list");
    assert!(!sync.has_synced());
}

#[tokio::test]
async fn namespace_scoped_synchronizer_ignores_other_namespaces() {
    let store = MemoryStore::new();
    store.create(deployment("in-default", 1)).await.unwrap();
    store
        .create(Object::new(
            ResourceKey::namespaced("kube-system", "dns"),
            json!({}),
        ))
        .await
        .unwrap();

    let config = SynchronizerConfig::builder()
        .kind("deployments")
        .selector(ListSelector::namespace("default"))
        .build()
        .unwrap();
    let recorder = Recorder::new();
    let sync = Synchronizer::new(Arc::new(store.clone()), config);
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();
    eventually("watch open", || store.watcher_count() == 1).await;

    store
        .create(Object::new(
            ResourceKey::namespaced("kube-system", "proxy"),
            json!({}),
        ))
        .await
        .unwrap();
    store.create(deployment("second", 1)).await.unwrap();

    eventually("second", || recorder.len() == 2).await;
    assert!(recorder.seen().iter().all(|s| s.key.starts_with("default/")));
    assert_eq!(sync.cache().by_namespace("kube-system").len(), 0);

    sync.stop().await;
}

#[tokio::test]
async fn resync_replays_nothing_when_in_sync() {
    let store = MemoryStore::new();
    store.create(deployment("a", 1)).await.unwrap();

    let config = SynchronizerConfig::builder()
        .kind("deployments")
        .resync_period(Duration::from_millis(25))
        .build()
        .unwrap();
    let recorder = Recorder::new();
    let sync = Synchronizer::new(Arc::new(store.clone()), config);
    sync.start(recorder.registry()).unwrap();
    sync.wait_for_sync(Duration::from_secs(2)).await.unwrap();

    eventually("several resyncs", || store.list_calls() >= 3).await;
    // unchanged versions produce no deltas on relist
    assert_eq!(recorder.len(), 1);

    sync.stop().await;
}
