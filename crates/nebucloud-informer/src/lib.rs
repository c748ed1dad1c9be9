//! # nebucloud-informer
//!
//! Watch-driven resource caches for Rust controllers.
//!
//! An informer keeps an in-memory copy of a remote, versioned resource
//! collection (a Kubernetes API group, or anything shaped like one) and tells
//! registered handlers about every change. It supports:
//!
//! - Initial list, then watch from the listed version
//! - Relist on expired history, with backoff on stream failures
//! - Optional periodic resync
//! - Ordered, failure-isolated handler dispatch
//! - Conflict-retrying read-modify-write updates
//!
//! ## Quick Start
//!
//! ```rust
//! use nebucloud_informer::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> InformerResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let sync = Synchronizer::new(store.clone(), SynchronizerConfig::default());
//! sync.add_handler(
//!     "log",
//!     HandlerFuncs::new().on_add(|obj| {
//!         println!("added {}", obj.key());
//!         Ok(())
//!     }),
//! )?;
//! sync.start(HandlerRegistry::new())?;
//! sync.wait_for_sync(Duration::from_secs(5)).await?;
//!
//! let key = ResourceKey::namespaced("default", "web");
//! store.create(Object::new(key, json!({"spec": {"replicas": 1}}))).await?;
//!
//! sync.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! This library is organized into several crates:
//!
//! - `informer-core` - Keys, versions, objects, events, the `RemoteStore` trait, errors
//! - `informer-cache` - The version-aware local cache
//! - `informer-runtime` - Synchronizer, watch reader, handlers, mutator, in-memory store
//!
//! This crate (`nebucloud-informer`) re-exports all public APIs for convenience.
//!
//! ## Design Principles
//!
//! 1. **No panics in library code** - All errors are returned as `Result`
//! 2. **No locks held across await points** - Cache and store locks are synchronous and short
//! 3. **Versions come from the server** - Nothing is ever stamped locally
//! 4. **Observable** - Built-in metrics and tracing support

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

// Re-export all sub-crates
pub use informer_cache as cache;
pub use informer_core as core;
pub use informer_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust
/// use nebucloud_informer::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use informer_core::{
        ChangeEvent, ChangeKind, InformerError, InformerResult, ListSelector, Object, ObjectList,
        PropagationPolicy, RemoteStore, ResourceKey, ResourceVersion, SharedStore,
    };

    // Cache types
    pub use informer_cache::{CacheDelta, CacheEntry, CacheSnapshot, CacheStats, LocalCache};

    // Runtime types
    pub use informer_runtime::{
        retry_on_conflict, BackoffPolicy, EventHandler, HandlerFuncs, HandlerRegistry,
        HandlerResult, InformerFactory, MemoryStore, Mutator, RetryPolicy, SyncState,
        Synchronizer, SynchronizerConfig,
    };
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";

    /// Get version info as a string.
    pub fn version_string() -> String {
        format!("nebucloud-informer {} (MSRV {})", VERSION, MSRV)
    }
}
