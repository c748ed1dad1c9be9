//! # informer-cache
//!
//! Local mirror of a remote resource collection.
//!
//! This crate provides the caching layer of an informer:
//!
//! - [`LocalCache`] - Key to last-known object map, mutated by applying watch events
//! - [`CacheSnapshot`] - Immutable point-in-time copy of all entries
//! - [`CacheDelta`] - The handler-facing change produced by applying an event
//! - [`CacheStats`] - Atomic counters for monitoring
//!
//! ## Key Design Decisions
//!
//! - One writer (the owning synchronizer), any number of concurrent readers
//! - Every event and every relist is applied under a single write lock, so
//!   readers never see a half-applied change
//! - Entries are stored behind `Arc`; readers get shared immutable copies
//! - Older versions never overwrite newer ones; same-version replays are no-ops
//!
//! ## Example
//!
//! ```rust
//! use informer_cache::LocalCache;
//! use informer_core::{ChangeEvent, Object, ResourceKey};
//! use serde_json::json;
//!
//! let cache = LocalCache::new();
//! let key = ResourceKey::namespaced("default", "web");
//! let obj = Object::new(key.clone(), json!({"replicas": 1})).with_version("3");
//!
//! let delta = cache.apply_event(&ChangeEvent::Added(obj));
//! assert!(delta.is_some());
//! assert_eq!(cache.get(&key).unwrap().version().as_str(), "3");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod snapshot;
mod stats;

pub use cache::{CacheDelta, CacheEntry, LocalCache};
pub use snapshot::CacheSnapshot;
pub use stats::CacheStats;
