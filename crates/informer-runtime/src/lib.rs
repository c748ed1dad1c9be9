//! # informer-runtime
//!
//! List/watch synchronization and conflict-safe mutation against a
//! [`informer_core::RemoteStore`].
//!
//! This crate provides the moving parts of an informer:
//!
//! - [`Synchronizer`] - Lists, watches, relists and resyncs, keeping a
//!   [`informer_cache::LocalCache`] current and notifying handlers
//! - [`WatchSession`] - One watch subscription and its close reason
//! - [`EventHandler`] / [`HandlerFuncs`] / [`HandlerRegistry`] - Ordered,
//!   failure-isolated change notification
//! - [`Mutator`] / [`retry_on_conflict`] - Read-modify-write retried on
//!   version conflicts
//! - [`InformerFactory`] - One shared synchronizer per resource kind
//! - [`MemoryStore`] - In-process store with watch history and fault hooks
//! - Metrics through the `metrics` facade
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use informer_core::{Object, RemoteStore, ResourceKey};
//! use informer_runtime::{
//!     HandlerRegistry, MemoryStore, Mutator, RetryPolicy, Synchronizer, SynchronizerConfig,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> informer_core::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let key = ResourceKey::namespaced("default", "web");
//! store.create(Object::new(key.clone(), json!({"spec": {"replicas": 1}}))).await?;
//!
//! let sync = Synchronizer::new(store.clone(), SynchronizerConfig::default());
//! sync.start(HandlerRegistry::new())?;
//! sync.wait_for_sync(Duration::from_secs(5)).await?;
//!
//! let mutator = Mutator::new(store);
//! let updated = mutator
//!     .mutate(
//!         &key,
//!         |current| {
//!             let mut next = current.clone();
//!             next.set_nested(&["spec", "replicas"], json!(3))?;
//!             Ok(next)
//!         },
//!         &RetryPolicy::default_retry(),
//!     )
//!     .await?;
//! assert_eq!(updated.version().as_str(), "2");
//!
//! sync.stop().await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod config;
mod factory;
mod handler;
pub mod memory;
pub mod metrics;
mod mutator;
pub mod reader;
pub mod shutdown;
mod synchronizer;

pub use backoff::Backoff;
pub use config::{BackoffPolicy, RetryPolicy, SynchronizerConfig, SynchronizerConfigBuilder};
pub use factory::InformerFactory;
pub use handler::{EventHandler, HandlerFuncs, HandlerRegistry, HandlerResult};
pub use memory::MemoryStore;
pub use self::metrics::{InformerMetrics, MutatorMetrics};
pub use mutator::{retry_on_conflict, MutationAttempt, Mutator};
pub use reader::{CancelMode, CloseReason, SessionId, SessionState, WatchSession};
pub use shutdown::{StopController, StopSignal};
pub use synchronizer::{SyncState, Synchronizer};
