//! LocalCache: the key to last-known-object map behind an informer.
//!
//! The cache is mutated only by its owning synchronizer, through
//! [`LocalCache::apply_event`] and [`LocalCache::replace`]. Both return the
//! [`CacheDelta`]s that handlers should observe, so what handlers see is
//! exactly what the cache applied.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use informer_core::{ChangeEvent, ChangeKind, Object, ResourceKey, ResourceVersion};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::snapshot::CacheSnapshot;
use crate::stats::CacheStats;

/// A cached object and its version.
///
/// The object is shared behind an `Arc`; holders of an entry cannot mutate
/// the cache's copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    object: Arc<Object>,
}

impl CacheEntry {
    /// Wrap a stored object.
    pub fn new(object: Arc<Object>) -> Self {
        Self { object }
    }

    /// Resource key.
    #[inline]
    pub fn key(&self) -> &ResourceKey {
        self.object.key()
    }

    /// Cached version.
    #[inline]
    pub fn version(&self) -> &ResourceVersion {
        self.object.version()
    }

    /// Cached object.
    #[inline]
    pub fn object(&self) -> &Arc<Object> {
        &self.object
    }
}

/// A change the cache applied, ready for handler dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDelta {
    /// What happened to the key.
    pub kind: ChangeKind,
    /// The new object, or the last known object for deletes.
    pub object: Arc<Object>,
    /// The entry this change replaced, if any.
    pub previous: Option<Arc<Object>>,
}

impl CacheDelta {
    /// Key of the changed resource.
    #[inline]
    pub fn key(&self) -> &ResourceKey {
        self.object.key()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<ResourceKey, CacheEntry>,
    /// Latest version observed from a list, event, or bookmark.
    watermark: ResourceVersion,
}

impl CacheState {
    fn advance_watermark(&mut self, version: &ResourceVersion) {
        if version.is_empty() {
            return;
        }
        if !version.is_older_than(&self.watermark) {
            self.watermark = version.clone();
        }
    }
}

/// Local mirror of a remote collection.
///
/// ## Thread Safety
///
/// Reads (`get`, `snapshot`, `len`) take a shared lock and may run from any
/// thread concurrently with the writer. Each event and each relist is
/// applied under one exclusive lock, so a reader never observes a partially
/// applied change. No lock is ever held across an `.await`.
#[derive(Debug, Default)]
pub struct LocalCache {
    state: RwLock<CacheState>,
    stats: CacheStats,
}

impl LocalCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: HashMap::with_capacity(capacity),
                watermark: ResourceVersion::empty(),
            }),
            stats: CacheStats::new(),
        }
    }

    /// Get cache statistics.
    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Apply one watch event.
    ///
    /// - `Added`/`Modified` upsert unless the cached version is newer; the
    ///   same version is an idempotent no-op.
    /// - `Deleted` removes the key without comparing versions.
    /// - `Bookmark` advances the watermark only.
    /// - `Error` is ignored; the stream reader handles it.
    ///
    /// Returns the delta to dispatch, or `None` if nothing changed.
    pub fn apply_event(&self, event: &ChangeEvent) -> Option<CacheDelta> {
        match event {
            ChangeEvent::Added(obj) | ChangeEvent::Modified(obj) => self.upsert(obj),
            ChangeEvent::Deleted(obj) => self.remove(obj),
            ChangeEvent::Bookmark(version) => {
                self.state.write().advance_watermark(version);
                self.stats.record_bookmark();
                trace!(version = %version, "bookmark");
                None
            }
            ChangeEvent::Error(_) => None,
        }
    }

    fn upsert(&self, obj: &Object) -> Option<CacheDelta> {
        let mut state = self.state.write();
        let previous = state.entries.get(obj.key()).map(|e| Arc::clone(e.object()));

        if let Some(prev) = &previous {
            match obj.version().observed_order(prev.version()) {
                Some(Ordering::Less) => {
                    self.stats.record_stale();
                    debug!(
                        key = %obj.key(),
                        cached = %prev.version(),
                        incoming = %obj.version(),
                        "skipping stale event"
                    );
                    return None;
                }
                Some(Ordering::Equal) => {
                    self.stats.record_replay();
                    trace!(key = %obj.key(), version = %obj.version(), "replayed event");
                    return None;
                }
                // Newer, or opaque tokens the server ordered for us.
                Some(Ordering::Greater) | None => {}
            }
        }

        let object = Arc::new(obj.clone());
        state
            .entries
            .insert(obj.key().clone(), CacheEntry::new(Arc::clone(&object)));
        state.advance_watermark(obj.version());
        drop(state);

        self.stats.record_applied();
        let kind = if previous.is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        trace!(key = %obj.key(), version = %obj.version(), kind = %kind, "applied event");

        Some(CacheDelta {
            kind,
            object,
            previous,
        })
    }

    fn remove(&self, obj: &Object) -> Option<CacheDelta> {
        let mut state = self.state.write();
        let removed = state.entries.remove(obj.key());
        state.advance_watermark(obj.version());
        drop(state);

        // Already gone (e.g. reconciled away by a relist): report nothing twice.
        let removed = removed?;
        self.stats.record_applied();
        self.stats.record_deletes(1);
        trace!(key = %obj.key(), version = %obj.version(), "deleted entry");

        Some(CacheDelta {
            kind: ChangeKind::Deleted,
            object: Arc::new(obj.clone()),
            previous: Some(Arc::clone(removed.object())),
        })
    }

    /// Replace the whole cache with a fresh list response.
    ///
    /// Keys missing from `items` are reported as `Deleted` (carrying the
    /// cached object), keys new in `items` as `Added`, and keys whose version
    /// moved as `Modified`. Unchanged entries produce nothing. Listed
    /// objects older than the cached copy keep the cached copy. Deltas for
    /// listed items come first in list order, then deletions in key order.
    pub fn replace(&self, items: Vec<Object>, version: ResourceVersion) -> Vec<CacheDelta> {
        let mut state = self.state.write();
        let mut old = std::mem::take(&mut state.entries);
        let mut entries = HashMap::with_capacity(items.len());
        let mut deltas = Vec::new();
        let mut seen = HashSet::with_capacity(items.len());

        for obj in items {
            if !seen.insert(obj.key().clone()) {
                debug!(key = %obj.key(), "duplicate key in list response, keeping first");
                continue;
            }

            match old.remove(obj.key()) {
                Some(prev) => match obj.version().observed_order(prev.version()) {
                    Some(Ordering::Equal) => {
                        entries.insert(obj.key().clone(), prev);
                    }
                    Some(Ordering::Less) => {
                        self.stats.record_stale();
                        entries.insert(obj.key().clone(), prev);
                    }
                    Some(Ordering::Greater) | None => {
                        let object = Arc::new(obj);
                        entries.insert(object.key().clone(), CacheEntry::new(Arc::clone(&object)));
                        deltas.push(CacheDelta {
                            kind: ChangeKind::Modified,
                            object,
                            previous: Some(Arc::clone(prev.object())),
                        });
                    }
                },
                None => {
                    let object = Arc::new(obj);
                    entries.insert(object.key().clone(), CacheEntry::new(Arc::clone(&object)));
                    deltas.push(CacheDelta {
                        kind: ChangeKind::Added,
                        object,
                        previous: None,
                    });
                }
            }
        }

        let mut vanished: Vec<CacheEntry> = old.into_values().collect();
        vanished.sort_by(|a, b| a.key().cmp(b.key()));
        let deleted = vanished.len() as u64;
        for entry in vanished {
            deltas.push(CacheDelta {
                kind: ChangeKind::Deleted,
                object: Arc::clone(entry.object()),
                previous: Some(Arc::clone(entry.object())),
            });
        }

        state.entries = entries;
        state.watermark = version;
        let size = state.entries.len();
        let watermark = state.watermark.clone();
        drop(state);

        self.stats.record_replace();
        self.stats.record_deletes(deleted);
        debug!(
            version = %watermark,
            entries = size,
            deltas = deltas.len(),
            deleted,
            "replaced cache from list"
        );

        deltas
    }

    /// Get the entry for a key. Never blocks on the writer for longer than one event.
    pub fn get(&self, key: &ResourceKey) -> Option<CacheEntry> {
        let result = self.state.read().entries.get(key).cloned();
        if result.is_some() {
            self.stats.record_hit();
            trace!(key = %key, "cache hit");
        } else {
            self.stats.record_miss();
            trace!(key = %key, "cache miss");
        }
        result
    }

    /// Take an immutable point-in-time copy of all entries.
    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.read();
        CacheSnapshot::new(state.watermark.clone(), state.entries.clone())
    }

    /// Entries in one namespace, sorted by key.
    pub fn by_namespace(&self, namespace: &str) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .state
            .read()
            .entries
            .values()
            .filter(|e| e.key().namespace() == Some(namespace))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        entries
    }

    /// Whether the cache holds a key.
    pub fn contains_key(&self, key: &ResourceKey) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Latest version observed from a list, event, or bookmark.
    pub fn watermark(&self) -> ResourceVersion {
        self.state.read().watermark.clone()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Drop all entries and the watermark. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.write();
        let count = state.entries.len();
        state.entries.clear();
        state.watermark = ResourceVersion::empty();
        drop(state);

        debug!(count, "cleared cache");
        count
    }
}
