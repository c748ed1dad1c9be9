//! Conflict-retrying mutation against a shared store.

use std::sync::Arc;
use std::time::Duration;

use nebucloud_informer::prelude::*;
use serde_json::{json, Value};

use crate::support::{deployment, GatedStore};

fn web() -> ResourceKey {
    ResourceKey::namespaced("default", "web")
}

fn add_replica(obj: &Object) -> InformerResult<Object> {
    let replicas = obj
        .get_nested(&["spec", "replicas"])
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let mut next = obj.clone();
    next.set_nested(&["spec", "replicas"], json!(replicas + 1))?;
    Ok(next)
}

fn quick(attempts: u32) -> RetryPolicy {
    RetryPolicy::default_retry()
        .with_max_attempts(attempts)
        .without_jitter()
}

#[tokio::test]
async fn concurrent_mutations_both_apply() {
    let store = MemoryStore::new();
    let created = store.create(deployment("web", 1)).await.unwrap();
    assert_eq!(created.version().as_str(), "1");

    // both writers read version 1 before either writes
    let gated = GatedStore::new(store.clone(), 2);
    let first = Mutator::new(gated.clone());
    let second = Mutator::new(gated);
    let key = web();
    let policy = quick(5);

    let (a, b) = tokio::join!(
        first.mutate(&key, add_replica, &policy),
        second.mutate(&key, add_replica, &policy),
    );
    let mut versions = vec![
        a.unwrap().version().to_string(),
        b.unwrap().version().to_string(),
    ];
    versions.sort();
    assert_eq!(versions, vec!["2", "3"]);

    let stored = store.get(&key).await.unwrap();
    assert_eq!(stored.version().as_str(), "3");
    assert_eq!(stored.get_nested(&["spec", "replicas"]), Some(&json!(3)));
}

#[tokio::test]
async fn single_attempt_budget_fails_all_but_one_writer() {
    let store = MemoryStore::new();
    store.create(deployment("web", 0)).await.unwrap();

    let writers = 5;
    let gated = GatedStore::new(store.clone(), writers);
    let key = web();
    let policy = quick(1);

    let tasks: Vec<_> = (0..writers)
        .map(|_| {
            let mutator = Mutator::new(gated.clone());
            let key = key.clone();
            let policy = policy.clone();
            tokio::spawn(async move { mutator.mutate(&key, add_replica, &policy).await })
        })
        .collect();

    let mut applied = 0;
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => applied += 1,
            Err(InformerError::ConflictExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 1);
                assert!(last.is_conflict());
                exhausted += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(exhausted, writers - 1);

    let stored = store.get(&key).await.unwrap();
    assert_eq!(stored.get_nested(&["spec", "replicas"]), Some(&json!(1)));
}

#[tokio::test]
async fn deadline_is_reported_as_timeout() {
    let store = MemoryStore::new();
    store.create(deployment("web", 1)).await.unwrap();

    // a second reader never arrives, so the read blocks
    let gated = GatedStore::new(store.clone(), 2);
    let mutator = Mutator::new(gated);

    let err = mutator
        .mutate_with_deadline(
            &web(),
            add_replica,
            &quick(5),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, InformerError::Timeout { .. }), "got {err:?}");
    assert_eq!(store.get(&web()).await.unwrap().version().as_str(), "1");
}

#[tokio::test]
async fn missing_object_surfaces_not_found() {
    let mutator = Mutator::new(Arc::new(MemoryStore::new()));
    let err = mutator
        .mutate(&web(), add_replica, &quick(5))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn retry_on_conflict_drives_custom_operations() {
    let store = MemoryStore::new();
    let created = store.create(deployment("web", 1)).await.unwrap();
    // make the remembered version stale
    store.put(created.clone());

    let key = web();
    let stale = created.version().clone();
    let result = retry_on_conflict(&quick(3), &key, |attempt| {
        let store = store.clone();
        let key = key.clone();
        let stale = stale.clone();
        async move {
            let expected = if attempt == 1 {
                stale
            } else {
                store.get(&key).await?.version().clone()
            };
            let mut next = store.get(&key).await?;
            next.set_nested(&["metadata", "annotations", "touched"], json!("yes"))?;
            store.update(next, &expected).await
        }
    })
    .await
    .unwrap();

    assert_eq!(result.version().as_str(), "3");
    assert_eq!(
        result.get_nested(&["metadata", "annotations", "touched"]),
        Some(&json!("yes"))
    );
}

#[tokio::test]
async fn deployment_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let key = web();

    let created = store.create(deployment("web", 1)).await.unwrap();
    assert!(matches!(
        store.create(deployment("web", 1)).await,
        Err(InformerError::AlreadyExists { .. })
    ));

    let mutator = Mutator::new(store.clone());
    let scaled = mutator
        .mutate(&key, add_replica, &RetryPolicy::default_retry())
        .await
        .unwrap();
    let rolled = mutator
        .mutate(
            &key,
            |obj| {
                let mut next = obj.clone();
                next.set_nested(&["spec", "template", "image"], json!("nginx:1.27"))?;
                Ok(next)
            },
            &RetryPolicy::default_retry(),
        )
        .await
        .unwrap();
    assert!(created.version().is_older_than(scaled.version()));
    assert!(scaled.version().is_older_than(rolled.version()));
    assert_eq!(rolled.get_nested(&["spec", "replicas"]), Some(&json!(2)));
    assert_eq!(
        rolled.get_nested(&["spec", "template", "image"]),
        Some(&json!("nginx:1.27"))
    );

    let listed = store.list(&ListSelector::namespace("default")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed.items[0], rolled);
    assert_eq!(listed.version, *rolled.version());

    store
        .delete(&key, PropagationPolicy::Foreground)
        .await
        .unwrap();
    assert_eq!(
        store.last_delete_policy(&key),
        Some(PropagationPolicy::Foreground)
    );
    assert!(store.get(&key).await.unwrap_err().is_not_found());
    assert!(store.list(&ListSelector::all()).await.unwrap().is_empty());
}
