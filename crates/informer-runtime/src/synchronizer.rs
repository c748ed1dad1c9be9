//! The list/watch state machine.
//!
//! One worker task per [`Synchronizer`] drives:
//!
//! ```text
//! Initializing -> Listing -> Streaming -+-> Listing        (expired: at once)
//!                    ^                   +-> Listing        (eof/error: after backoff)
//!                    |                   +-> Resyncing -> Listing  (resync tick)
//!                    +-- failed list, after backoff
//! any state -> Stopped
//! ```
//!
//! Every change is applied to the [`LocalCache`] first, then handed to the
//! handlers in registration order on the same worker, so handlers for a
//! given key see changes in the order the store made them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use informer_cache::{CacheDelta, LocalCache};
use informer_core::{
    ChangeEvent, InformerError, ObjectList, ResourceVersion, Result, SharedStore,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::backoff::Backoff;
use crate::config::SynchronizerConfig;
use crate::handler::{EventHandler, HandlerRegistry};
use crate::metrics::InformerMetrics;
use crate::reader::{with_deadline, CancelMode, CloseReason, WatchSession};
use crate::shutdown::{StopController, StopSignal};

/// Synchronizer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Created, not started. Handlers may be registered.
    Initializing,
    /// Listing the collection.
    Listing,
    /// Applying watch events.
    Streaming,
    /// A periodic resync is about to relist.
    Resyncing,
    /// Terminal.
    Stopped,
}

impl SyncState {
    /// Lowercase label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Listing => "listing",
            Self::Streaming => "streaming",
            Self::Resyncing => "resyncing",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keeps a [`LocalCache`] consistent with a [`informer_core::RemoteStore`]
/// collection and notifies handlers of every change.
///
/// Cloning is cheap; clones share the worker.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use informer_runtime::{HandlerRegistry, MemoryStore, Synchronizer, SynchronizerConfig};
///
/// # async fn example() -> informer_core::Result<()> {
/// let store = Arc::new(MemoryStore::new());
/// let sync = Synchronizer::new(store, SynchronizerConfig::default());
/// sync.start(HandlerRegistry::new())?;
/// sync.wait_for_sync(Duration::from_secs(5)).await?;
/// println!("{} objects cached", sync.cache().len());
/// sync.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    store: SharedStore,
    config: SynchronizerConfig,
    cache: Arc<LocalCache>,
    /// Handlers registered before start.
    pending: Mutex<HandlerRegistry>,
    started: AtomicBool,
    state_tx: watch::Sender<SyncState>,
    /// Version of the most recent successful list; `None` until the first.
    synced_tx: watch::Sender<Option<ResourceVersion>>,
    stop: StopController,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: InformerMetrics,
}

/// How a streaming phase ended.
enum StreamOutcome {
    Closed { reason: CloseReason, delivered: u64 },
    Resync,
}

impl Synchronizer {
    /// Create a synchronizer. Nothing happens until [`Synchronizer::start`].
    pub fn new(store: SharedStore, config: SynchronizerConfig) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Initializing);
        let (synced_tx, _) = watch::channel(None);
        let metrics = InformerMetrics::new(&config.kind);

        Self {
            inner: Arc::new(SyncInner {
                store,
                config,
                cache: Arc::new(LocalCache::new()),
                pending: Mutex::new(HandlerRegistry::new()),
                started: AtomicBool::new(false),
                state_tx,
                synced_tx,
                stop: StopController::new(),
                task: Mutex::new(None),
                metrics,
            }),
        }
    }

    /// Resource kind label.
    #[inline]
    pub fn kind(&self) -> &str {
        &self.inner.config.kind
    }

    /// Configuration in use.
    #[inline]
    pub fn config(&self) -> &SynchronizerConfig {
        &self.inner.config
    }

    /// Register a handler to receive changes once started.
    ///
    /// # Errors
    ///
    /// Returns [`InformerError::Configuration`] once the synchronizer has
    /// been started.
    pub fn add_handler<H>(&self, name: impl Into<String>, handler: H) -> Result<()>
    where
        H: EventHandler + 'static,
    {
        if self.inner.started.load(Ordering::Acquire) {
            return Err(InformerError::Configuration(format!(
                "{}: handlers must be registered before start",
                self.kind()
            )));
        }
        self.inner.pending.lock().register(name, Arc::new(handler));
        Ok(())
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// `handlers` run after any registered with [`Synchronizer::add_handler`].
    ///
    /// # Errors
    ///
    /// Returns [`InformerError::Stopped`] after [`Synchronizer::stop`] and
    /// [`InformerError::Configuration`] if already started.
    pub fn start(&self, handlers: HandlerRegistry) -> Result<()> {
        if self.inner.stop.is_stopped() {
            return Err(InformerError::Stopped);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(InformerError::Configuration(format!(
                "{} synchronizer already started",
                self.kind()
            )));
        }

        let mut registry = std::mem::take(&mut *self.inner.pending.lock());
        registry.append(handlers);
        info!(kind = %self.kind(), handlers = registry.len(), "starting synchronizer");

        let inner = Arc::clone(&self.inner);
        *self.inner.task.lock() = Some(tokio::spawn(inner.run(registry)));
        Ok(())
    }

    /// Stop the worker, cancelling any in-flight list or watch.
    ///
    /// Once this returns no handler is running or will run again, and the
    /// cache is empty. Idempotent.
    pub async fn stop(&self) {
        if self.inner.stop.stop() {
            info!(kind = %self.kind(), "stopping synchronizer");
        }

        let task = self.inner.task.lock().take();
        if let Some(mut handle) = task {
            let grace = self.inner.config.stop_grace_period;
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    error!(kind = %self.kind(), "synchronizer worker panicked");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(kind = %self.kind(), ?grace, "worker did not stop in time, aborting");
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        self.inner.set_state(SyncState::Stopped);
        let dropped = self.inner.cache.clear();
        self.inner.metrics.set_cache_entries(0);
        debug!(kind = %self.kind(), dropped, "cache cleared");
    }

    /// Whether [`Synchronizer::start`] has been called successfully.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.inner.state_tx.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether at least one list has completed and been applied.
    pub fn has_synced(&self) -> bool {
        self.inner.synced_tx.borrow().is_some()
    }

    /// Version of the most recent list applied to the cache.
    pub fn last_synced_version(&self) -> Option<ResourceVersion> {
        self.inner.synced_tx.borrow().clone()
    }

    /// Wait until the first list has been applied.
    ///
    /// # Errors
    ///
    /// [`InformerError::Timeout`] if `timeout` elapses first;
    /// [`InformerError::Stopped`] if the synchronizer stops first.
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<()> {
        let mut synced = self.inner.synced_tx.subscribe();
        let mut state = self.inner.state_tx.subscribe();

        let wait = async {
            loop {
                if synced.borrow_and_update().is_some() {
                    return Ok(());
                }
                if *state.borrow_and_update() == SyncState::Stopped {
                    return Err(InformerError::Stopped);
                }
                let changed = tokio::select! {
                    r = synced.changed() => r,
                    r = state.changed() => r,
                };
                changed.map_err(|_| InformerError::Stopped)?;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| InformerError::Timeout {
                operation: format!("initial sync of {}", self.kind()),
            })?
    }

    /// The cache this synchronizer maintains. Safe to read from any task.
    pub fn cache(&self) -> Arc<LocalCache> {
        Arc::clone(&self.inner.cache)
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("kind", &self.inner.config.kind)
            .field("state", &self.state())
            .field("cached", &self.inner.cache.len())
            .finish()
    }
}

impl SyncInner {
    fn set_state(&self, next: SyncState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            info!(kind = %self.config.kind, from = %prev, to = %next, "state transition");
        }
    }

    async fn run(self: Arc<Self>, handlers: HandlerRegistry) {
        let mut stop = self.stop.signal();
        // failed lists and unproductive watch sessions back off independently
        let mut list_backoff = Backoff::new(self.config.relist_backoff.clone());
        let mut watch_backoff = Backoff::new(self.config.relist_backoff.clone());
        let mut resync = self.config.resync_period.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            if stop.is_stopped() {
                break;
            }
            self.set_state(SyncState::Listing);

            let list = match self.list(&mut stop).await {
                Some(Ok(list)) => list,
                Some(Err(err)) => {
                    let delay = list_backoff.next_delay();
                    warn!(
                        kind = %self.config.kind,
                        error = %err,
                        attempt = list_backoff.steps(),
                        ?delay,
                        "list failed, retrying"
                    );
                    self.metrics.record_relist_backoff(delay);
                    if !pause(&mut stop, delay).await {
                        break;
                    }
                    continue;
                }
                None => break,
            };

            list_backoff.reset();
            let version = list.version.clone();
            self.apply_list(list, &handlers, &stop);
            if stop.is_stopped() {
                break;
            }
            if let Some(interval) = resync.as_mut() {
                interval.reset();
            }

            self.set_state(SyncState::Streaming);
            match self.stream(&stop, &handlers, version, resync.as_mut()).await {
                StreamOutcome::Resync => {
                    self.set_state(SyncState::Resyncing);
                }
                StreamOutcome::Closed {
                    reason: CloseReason::Cancelled,
                    ..
                } => break,
                StreamOutcome::Closed {
                    reason: CloseReason::Expired,
                    ..
                } => {
                    debug!(kind = %self.config.kind, "watch expired, relisting");
                }
                StreamOutcome::Closed { reason, delivered } => {
                    if delivered > 0 {
                        watch_backoff.reset();
                    }
                    let delay = watch_backoff.next_delay();
                    warn!(
                        kind = %self.config.kind,
                        reason = %reason,
                        delivered,
                        ?delay,
                        "watch closed, relisting after backoff"
                    );
                    self.metrics.record_relist_backoff(delay);
                    if !pause(&mut stop, delay).await {
                        break;
                    }
                }
            }
        }

        debug!(kind = %self.config.kind, "synchronizer worker exiting");
    }

    /// `None` when stopped mid-call.
    async fn list(&self, stop: &mut StopSignal) -> Option<Result<ObjectList>> {
        let call = self.store.list(&self.config.selector);
        let result = tokio::select! {
            biased;
            _ = stop.wait() => return None,
            result = with_deadline(self.config.request_timeout, "list", call) => result,
        };
        self.metrics.record_list(result.is_ok());
        Some(result)
    }

    fn apply_list(&self, list: ObjectList, handlers: &HandlerRegistry, stop: &StopSignal) {
        let version = list.version.clone();
        let listed = list.items.len();
        let deltas = self.cache.replace(list.items, version.clone());
        info!(
            kind = %self.config.kind,
            version = %version,
            listed,
            changes = deltas.len(),
            "list applied"
        );

        for delta in &deltas {
            self.deliver(delta, handlers, stop);
        }
        self.metrics.set_cache_entries(self.cache.len());
        self.synced_tx.send_replace(Some(version));
    }

    async fn stream(
        &self,
        stop: &StopSignal,
        handlers: &HandlerRegistry,
        from: ResourceVersion,
        mut resync: Option<&mut Interval>,
    ) -> StreamOutcome {
        let mut session = WatchSession::open(
            &*self.store,
            from,
            &self.config.selector,
            stop.clone(),
            self.config.request_timeout,
        )
        .await;
        self.metrics.record_watch_opened();

        loop {
            let tick = async {
                match resync.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = tick => {
                    session.cancel(CancelMode::Discard);
                    self.metrics.record_watch_closed(CloseReason::Cancelled.as_str());
                    debug!(kind = %self.config.kind, session = %session.id(), "periodic resync");
                    return StreamOutcome::Resync;
                }
                event = session.next_event() => match event {
                    Some(event) => self.apply_event(&event, handlers, stop),
                    None => break,
                },
            }
        }

        let reason = session.close_reason().unwrap_or(CloseReason::Eof);
        self.metrics.record_watch_closed(reason.as_str());
        StreamOutcome::Closed {
            reason,
            delivered: session.events_delivered(),
        }
    }

    fn apply_event(&self, event: &ChangeEvent, handlers: &HandlerRegistry, stop: &StopSignal) {
        match self.cache.apply_event(event) {
            Some(delta) => {
                self.deliver(&delta, handlers, stop);
                self.metrics.set_cache_entries(self.cache.len());
            }
            None => {
                trace!(kind = %self.config.kind, event = event.label(), version = ?event.version(), "no cache change");
            }
        }
    }

    fn deliver(&self, delta: &CacheDelta, handlers: &HandlerRegistry, stop: &StopSignal) {
        self.metrics.record_event(delta.kind.as_str());
        trace!(
            kind = %self.config.kind,
            key = %delta.key(),
            change = %delta.kind,
            version = %delta.object.version(),
            "dispatching"
        );
        handlers.dispatch(delta, stop, &self.metrics);
    }
}

/// Sleep for `delay`; `false` if stopped first.
async fn pause(stop: &mut StopSignal, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = stop.wait() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
