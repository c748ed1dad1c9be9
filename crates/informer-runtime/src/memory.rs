//! In-memory [`RemoteStore`].
//!
//! Behaves like an API server collection closely enough to drive the
//! synchronizer and mutator end to end:
//!
//! - a single monotonically increasing revision counter stamps every write
//! - optimistic concurrency on update, with [`InformerError::Conflict`]
//! - watch replay from any retained revision, with `Expired` once the
//!   history has been compacted past the requested position
//! - selector-scoped watches that see objects entering and leaving scope as
//!   `Added` and `Deleted`
//!
//! Fault hooks ([`MemoryStore::disconnect_watchers`],
//! [`MemoryStore::expire_watchers`], [`MemoryStore::fail_next_lists`], ...)
//! let tests force every recovery path.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use informer_core::{
    ChangeEvent, InformerError, ListSelector, Object, ObjectList, PropagationPolicy, RemoteStore,
    ResourceKey, ResourceVersion, Result, WatchStatus, WatchStream,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};

/// Default number of revisions retained for watch replay.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

type EventSender = mpsc::UnboundedSender<Result<ChangeEvent>>;

/// A thread-safe, versioned, in-memory object collection.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    objects: BTreeMap<ResourceKey, Object>,
    revision: u64,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
    /// Revisions at or below this are no longer replayable.
    compacted: u64,
    watchers: Vec<Watcher>,
    next_watcher: u64,
    list_failures: u32,
    list_calls: u64,
    watch_calls: u64,
    last_watch_from: Option<ResourceVersion>,
    delete_policies: BTreeMap<ResourceKey, PropagationPolicy>,
}

/// One write. `previous` is the state before, `current` the state after;
/// a delete has `current == None` and `previous` carries the delete revision.
struct HistoryEntry {
    revision: u64,
    previous: Option<Object>,
    current: Option<Object>,
}

struct Watcher {
    id: u64,
    selector: ListSelector,
    tx: EventSender,
}

/// Translate a write into the event a watcher with `selector` observes.
fn project(selector: &ListSelector, entry: &HistoryEntry) -> Option<ChangeEvent> {
    let was_in = entry.previous.as_ref().is_some_and(|o| selector.matches(o));
    let is_in = entry.current.as_ref().is_some_and(|o| selector.matches(o));

    match (was_in, is_in, &entry.previous, &entry.current) {
        (false, true, _, Some(current)) => Some(ChangeEvent::Added(current.clone())),
        (true, true, _, Some(current)) => Some(ChangeEvent::Modified(current.clone())),
        // left the selector: report the new state as a delete
        (true, false, _, Some(current)) => Some(ChangeEvent::Deleted(current.clone())),
        (true, false, Some(previous), None) => Some(ChangeEvent::Deleted(previous.clone())),
        _ => None,
    }
}

impl StoreInner {
    fn new(history_limit: usize) -> Self {
        Self {
            objects: BTreeMap::new(),
            revision: 0,
            history: VecDeque::new(),
            history_limit,
            compacted: 0,
            watchers: Vec::new(),
            next_watcher: 1,
            list_failures: 0,
            list_calls: 0,
            watch_calls: 0,
            last_watch_from: None,
            delete_policies: BTreeMap::new(),
        }
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn record(&mut self, entry: HistoryEntry) {
        self.watchers.retain(|watcher| {
            let open = match project(&watcher.selector, &entry) {
                Some(event) => watcher.tx.send(Ok(event)).is_ok(),
                None => !watcher.tx.is_closed(),
            };
            if !open {
                trace!(watcher = watcher.id, "watcher dropped");
            }
            open
        });

        self.history.push_back(entry);
        while self.history.len() > self.history_limit {
            if let Some(dropped) = self.history.pop_front() {
                self.compacted = dropped.revision;
            }
        }
    }

    fn broadcast(&mut self, make: impl Fn() -> Result<ChangeEvent>) -> usize {
        let before = self.watchers.len();
        self.watchers.retain(|watcher| watcher.tx.send(make()).is_ok());
        before
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create an empty store retaining at most `limit` revisions for replay.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::new(limit))),
        }
    }

    /// Current collection revision.
    pub fn revision(&self) -> ResourceVersion {
        ResourceVersion::from(self.inner.lock().revision)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().objects.is_empty()
    }

    /// Number of open watch subscriptions.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    /// Number of `list` calls served, including injected failures.
    pub fn list_calls(&self) -> u64 {
        self.inner.lock().list_calls
    }

    /// Number of `watch` calls served.
    pub fn watch_calls(&self) -> u64 {
        self.inner.lock().watch_calls
    }

    /// Version the most recent `watch` call asked to start from.
    pub fn last_watch_from(&self) -> Option<ResourceVersion> {
        self.inner.lock().last_watch_from.clone()
    }

    /// Propagation policy used by the last delete of `key`.
    pub fn last_delete_policy(&self, key: &ResourceKey) -> Option<PropagationPolicy> {
        self.inner.lock().delete_policies.get(key).copied()
    }

    /// Make the next `n` list calls fail with a transport error.
    pub fn fail_next_lists(&self, n: u32) {
        self.inner.lock().list_failures = n;
    }

    /// Drop all retained history; watches from any earlier revision expire.
    pub fn compact(&self) {
        let mut inner = self.inner.lock();
        inner.history.clear();
        inner.compacted = inner.revision;
        debug!(revision = inner.compacted, "history compacted");
    }

    /// End every open watch cleanly.
    pub fn disconnect_watchers(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.watchers.len();
        inner.watchers.clear();
        debug!(watchers = n, "watchers disconnected");
        n
    }

    /// Send an `Expired` status to every open watch, then end them.
    pub fn expire_watchers(&self) -> usize {
        let mut inner = self.inner.lock();
        let version = ResourceVersion::from(inner.revision);
        let n = inner.broadcast(|| Ok(ChangeEvent::Error(WatchStatus::expired(&version))));
        inner.watchers.clear();
        debug!(watchers = n, "watchers expired");
        n
    }

    /// Fail every open watch with a transport error.
    pub fn fail_watchers(&self, message: &str) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.broadcast(|| Err(InformerError::transport_msg(message)));
        inner.watchers.clear();
        debug!(watchers = n, message, "watchers failed");
        n
    }

    /// Send a bookmark at the current revision to every open watch.
    pub fn send_bookmark(&self) -> usize {
        let mut inner = self.inner.lock();
        let version = ResourceVersion::from(inner.revision);
        inner.broadcast(|| Ok(ChangeEvent::Bookmark(version.clone())))
    }

    /// Insert or replace an object without a version check.
    ///
    /// Seeding helper: emits `Added` or `Modified` like a normal write.
    pub fn put(&self, mut object: Object) -> Object {
        let mut inner = self.inner.lock();
        let revision = inner.next_revision();
        object.set_version(ResourceVersion::from(revision));
        let previous = inner.objects.insert(object.key().clone(), object.clone());
        inner.record(HistoryEntry {
            revision,
            previous,
            current: Some(object.clone()),
        });
        object
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryStore")
            .field("objects", &inner.objects.len())
            .field("revision", &inner.revision)
            .field("compacted", &inner.compacted)
            .field("watchers", &inner.watchers.len())
            .finish()
    }
}

fn parse_revision(version: &ResourceVersion) -> Result<u64> {
    version.as_str().parse().map_err(|_| {
        InformerError::Configuration(format!("unparseable resource version '{version}'"))
    })
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, selector: &ListSelector) -> Result<ObjectList> {
        let mut inner = self.inner.lock();
        inner.list_calls += 1;
        if inner.list_failures > 0 {
            inner.list_failures -= 1;
            return Err(InformerError::transport_msg("injected list failure"));
        }

        let items: Vec<Object> = inner
            .objects
            .values()
            .filter(|o| selector.matches(o))
            .cloned()
            .collect();
        trace!(items = items.len(), revision = inner.revision, "list served");
        Ok(ObjectList::new(items, inner.revision))
    }

    async fn watch(&self, from: &ResourceVersion, selector: &ListSelector) -> Result<WatchStream> {
        let mut inner = self.inner.lock();
        inner.watch_calls += 1;
        inner.last_watch_from = Some(from.clone());

        let start = if from.is_empty() {
            inner.revision
        } else {
            parse_revision(from)?
        };

        if start < inner.compacted {
            debug!(from = %from, compacted = inner.compacted, "watch from compacted revision");
            let expired = ChangeEvent::Error(WatchStatus::expired(from));
            return Ok(futures::stream::iter([Ok(expired)]).boxed());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for entry in inner.history.iter().filter(|e| e.revision > start) {
            if let Some(event) = project(selector, entry) {
                // receiver is held below, send cannot fail
                let _ = tx.send(Ok(event));
            }
        }

        let id = inner.next_watcher;
        inner.next_watcher += 1;
        inner.watchers.push(Watcher {
            id,
            selector: selector.clone(),
            tx,
        });
        debug!(watcher = id, from = start, "watch registered");

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn get(&self, key: &ResourceKey) -> Result<Object> {
        self.inner
            .lock()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| InformerError::NotFound { key: key.clone() })
    }

    async fn create(&self, mut object: Object) -> Result<Object> {
        let mut inner = self.inner.lock();
        if inner.objects.contains_key(object.key()) {
            return Err(InformerError::AlreadyExists {
                key: object.key().clone(),
            });
        }

        let revision = inner.next_revision();
        object.set_version(ResourceVersion::from(revision));
        inner.objects.insert(object.key().clone(), object.clone());
        inner.record(HistoryEntry {
            revision,
            previous: None,
            current: Some(object.clone()),
        });
        trace!(key = %object.key(), revision, "created");
        Ok(object)
    }

    async fn update(&self, mut object: Object, expected: &ResourceVersion) -> Result<Object> {
        let mut inner = self.inner.lock();
        let key = object.key().clone();
        let current = match inner.objects.get(&key) {
            Some(current) => current.version().clone(),
            None => return Err(InformerError::NotFound { key }),
        };
        if &current != expected {
            return Err(InformerError::Conflict {
                key,
                expected: expected.clone(),
                current,
            });
        }

        let revision = inner.next_revision();
        object.set_version(ResourceVersion::from(revision));
        let previous = inner.objects.insert(key.clone(), object.clone());
        inner.record(HistoryEntry {
            revision,
            previous,
            current: Some(object.clone()),
        });
        trace!(key = %key, revision, "updated");
        Ok(object)
    }

    async fn delete(&self, key: &ResourceKey, propagation: PropagationPolicy) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(mut previous) = inner.objects.remove(key) else {
            return Err(InformerError::NotFound { key: key.clone() });
        };

        let revision = inner.next_revision();
        previous.set_version(ResourceVersion::from(revision));
        inner.delete_policies.insert(key.clone(), propagation);
        inner.record(HistoryEntry {
            revision,
            previous: Some(previous),
            current: None,
        });
        trace!(key = %key, revision, propagation = %propagation, "deleted");
        Ok(())
    }
}
