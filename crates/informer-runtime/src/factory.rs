//! Shared registry of synchronizers, one per resource kind.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future;
use informer_core::{Result, SharedStore};
use tracing::{debug, info};

use crate::config::SynchronizerConfig;
use crate::handler::HandlerRegistry;
use crate::synchronizer::{SyncState, Synchronizer};

/// Hands out one [`Synchronizer`] per kind and starts/stops them together.
///
/// Components that need the same collection share a single list/watch and
/// cache by asking the factory instead of building their own.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use informer_core::{ChangeKind, Object, ResourceKey};
/// use informer_runtime::{HandlerResult, InformerFactory, MemoryStore, SynchronizerConfig};
///
/// # async fn example() -> informer_core::Result<()> {
/// let factory = InformerFactory::new();
/// let deployments = factory.register(
///     "deployments",
///     Arc::new(MemoryStore::new()),
///     SynchronizerConfig::default(),
/// );
/// deployments.add_handler(
///     "log",
///     |kind: ChangeKind, key: &ResourceKey, _: &Object| -> HandlerResult {
///         println!("{kind} {key}");
///         Ok(())
///     },
/// )?;
///
/// factory.start_all()?;
/// factory.wait_for_cache_sync(Duration::from_secs(10)).await?;
/// factory.stop_all().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct InformerFactory {
    informers: Arc<DashMap<String, Synchronizer>>,
}

impl InformerFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the synchronizer for `kind`, creating it from `store` and
    /// `config` if this is the first request.
    ///
    /// The config's kind label is set to `kind`. Later calls for the same
    /// kind return the existing synchronizer and ignore their arguments.
    pub fn register(
        &self,
        kind: impl Into<String>,
        store: SharedStore,
        mut config: SynchronizerConfig,
    ) -> Synchronizer {
        let kind = kind.into();
        self.informers
            .entry(kind.clone())
            .or_insert_with(|| {
                debug!(kind = %kind, "registering synchronizer");
                config.kind = kind;
                Synchronizer::new(store, config)
            })
            .clone()
    }

    /// Get the synchronizer for `kind`.
    pub fn get(&self, kind: &str) -> Option<Synchronizer> {
        self.informers.get(kind).map(|r| r.value().clone())
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.informers.iter().map(|r| r.key().clone()).collect();
        kinds.sort();
        kinds
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.informers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.informers.is_empty()
    }

    /// Start every synchronizer not yet started. Returns how many were started.
    ///
    /// # Errors
    ///
    /// Returns the first start failure, e.g. for a stopped synchronizer.
    pub fn start_all(&self) -> Result<usize> {
        let mut started = 0;
        for sync in self.synchronizers() {
            if sync.is_started() && sync.state() != SyncState::Stopped {
                continue;
            }
            sync.start(HandlerRegistry::new())?;
            started += 1;
        }
        info!(started, total = self.len(), "started synchronizers");
        Ok(started)
    }

    /// Wait until every registered synchronizer has completed its first list.
    ///
    /// # Errors
    ///
    /// The first [`informer_core::InformerError::Timeout`] or
    /// [`informer_core::InformerError::Stopped`] encountered.
    pub async fn wait_for_cache_sync(&self, timeout: Duration) -> Result<()> {
        let syncs = self.synchronizers();
        future::try_join_all(syncs.iter().map(|s| s.wait_for_sync(timeout))).await?;
        debug!(kinds = syncs.len(), "all caches synced");
        Ok(())
    }

    /// Stop every synchronizer.
    pub async fn stop_all(&self) {
        let syncs = self.synchronizers();
        future::join_all(syncs.iter().map(|s| s.stop())).await;
        info!(stopped = syncs.len(), "stopped synchronizers");
    }

    /// Snapshot of the registered synchronizers; no map lock is held afterwards.
    fn synchronizers(&self) -> Vec<Synchronizer> {
        self.informers.iter().map(|r| r.value().clone()).collect()
    }
}
