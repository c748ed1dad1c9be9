//! Stop coordination for synchronizer workers.
//!
//! A [`StopController`] is owned by whoever may stop the worker; the worker
//! and every call it has in flight hold a [`StopSignal`] and race it against
//! their network I/O, so a stop interrupts a pending list or watch promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Controller for requesting a stop.
#[derive(Debug, Clone)]
pub struct StopController {
    inner: Arc<StopInner>,
}

#[derive(Debug)]
struct StopInner {
    /// Whether stop has been requested.
    requested: AtomicBool,
    /// Sender for the stop signal.
    tx: watch::Sender<bool>,
}

impl Default for StopController {
    fn default() -> Self {
        Self::new()
    }
}

impl StopController {
    /// Create a new controller.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(StopInner {
                requested: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Get a signal that resolves once stop is requested.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.inner.tx.subscribe(),
        }
    }

    /// Check if stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Request a stop. Returns `false` if one was already requested.
    pub fn stop(&self) -> bool {
        if self
            .inner
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        debug!("stop requested");
        self.inner.tx.send_replace(true);
        true
    }
}

/// Receiving side of a [`StopController`].
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Whether stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until stop is requested. Cancel-safe.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Controller dropped, treat as stop.
                return;
            }
        }
    }
}
