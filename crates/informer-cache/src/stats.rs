//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for cache operations.
///
/// All counters are atomic and can be safely accessed from multiple threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Events that changed an entry.
    events_applied: AtomicU64,
    /// Events dropped because a newer version was already cached.
    stale_skipped: AtomicU64,
    /// Events dropped because the same version was already cached.
    replays_skipped: AtomicU64,
    /// Entries removed by delete events or relists.
    deletes: AtomicU64,
    /// Wholesale replacements from list responses.
    replaces: AtomicU64,
    /// Bookmark watermarks recorded.
    bookmarks: AtomicU64,
    /// Lookups that found an entry.
    hits: AtomicU64,
    /// Lookups that found nothing.
    misses: AtomicU64,
}

impl CacheStats {
    /// Create new cache statistics.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_stale(&self) {
        self.stale_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_replay(&self) {
        self.replays_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_replace(&self) {
        self.replaces.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_bookmark(&self) {
        self.bookmarks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Events that changed an entry.
    #[inline]
    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    /// Events skipped as older than the cached version.
    #[inline]
    pub fn stale_skipped(&self) -> u64 {
        self.stale_skipped.load(Ordering::Relaxed)
    }

    /// Events skipped as replays of the cached version.
    #[inline]
    pub fn replays_skipped(&self) -> u64 {
        self.replays_skipped.load(Ordering::Relaxed)
    }

    /// Entries removed.
    #[inline]
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Relists applied.
    #[inline]
    pub fn replaces(&self) -> u64 {
        self.replaces.load(Ordering::Relaxed)
    }

    /// Bookmarks recorded.
    #[inline]
    pub fn bookmarks(&self) -> u64 {
        self.bookmarks.load(Ordering::Relaxed)
    }

    /// Lookup hits.
    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookup misses.
    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.events_applied,
            &self.stale_skipped,
            &self.replays_skipped,
            &self.deletes,
            &self.replaces,
            &self.bookmarks,
            &self.hits,
            &self.misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
