//! Snapshot: immutable point-in-time copy of the cache.
//!
//! A snapshot is taken under the cache's read lock, so it always reflects a
//! state between two applied events. It shares entry storage with the cache
//! and never changes after creation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use informer_core::{Object, ResourceKey, ResourceVersion};

use crate::cache::CacheEntry;

/// An immutable copy of every cache entry at one moment.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    /// Watermark version at the time of the snapshot.
    version: ResourceVersion,
    /// Entries keyed by resource key.
    entries: Arc<HashMap<ResourceKey, CacheEntry>>,
    /// Creation timestamp.
    created_at: Instant,
}

impl CacheSnapshot {
    pub(crate) fn new(version: ResourceVersion, entries: HashMap<ResourceKey, CacheEntry>) -> Self {
        Self {
            version,
            entries: Arc::new(entries),
            created_at: Instant::now(),
        }
    }

    /// Watermark version of the cache when the snapshot was taken.
    #[inline]
    pub fn version(&self) -> &ResourceVersion {
        &self.version
    }

    /// Get the creation timestamp.
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry by key.
    #[inline]
    pub fn get(&self, key: &ResourceKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Whether the snapshot contains a key.
    #[inline]
    pub fn contains_key(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &CacheEntry)> {
        self.entries.iter()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All objects, sorted by key.
    pub fn objects(&self) -> Vec<Arc<Object>> {
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        entries.into_iter().map(|e| Arc::clone(e.object())).collect()
    }
}
