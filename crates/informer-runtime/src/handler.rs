//! Event handlers and fan-out.
//!
//! Handlers run on the synchronizer's worker, after the cache has applied
//! the change they are told about. A handler that returns an error or
//! panics is logged and counted; the remaining handlers still run and the
//! synchronizer keeps going.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use informer_cache::CacheDelta;
use informer_core::{ChangeKind, InformerError, Object, ResourceKey};
use tracing::{error, trace};

use crate::metrics::InformerMetrics;
use crate::shutdown::StopSignal;

/// Result returned by handler callbacks.
pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Receives cache changes.
///
/// Implemented for any `Fn(ChangeKind, &ResourceKey, &Object) -> HandlerResult`.
/// For deletes, `object` is the last state the cache held.
pub trait EventHandler: Send + Sync {
    /// Called once per applied change.
    fn on_event(&self, kind: ChangeKind, key: &ResourceKey, object: &Object) -> HandlerResult;

    /// Called with the full delta, including the replaced object for updates.
    ///
    /// Defaults to [`EventHandler::on_event`].
    fn on_delta(&self, delta: &CacheDelta) -> HandlerResult {
        self.on_event(delta.kind, delta.key(), &delta.object)
    }
}

impl<F> EventHandler for F
where
    F: Fn(ChangeKind, &ResourceKey, &Object) -> HandlerResult + Send + Sync,
{
    fn on_event(&self, kind: ChangeKind, key: &ResourceKey, object: &Object) -> HandlerResult {
        self(kind, key, object)
    }
}

type AddFn = Box<dyn Fn(&Object) -> HandlerResult + Send + Sync>;
type UpdateFn = Box<dyn Fn(Option<&Object>, &Object) -> HandlerResult + Send + Sync>;
type DeleteFn = Box<dyn Fn(&Object) -> HandlerResult + Send + Sync>;

/// Handler assembled from per-change callbacks. Missing callbacks are no-ops.
///
/// ```
/// use informer_runtime::HandlerFuncs;
///
/// let handler = HandlerFuncs::new()
///     .on_add(|obj| {
///         println!("added {}", obj.key());
///         Ok(())
///     })
///     .on_delete(|obj| {
///         println!("deleted {}", obj.key());
///         Ok(())
///     });
/// # let _ = handler;
/// ```
#[derive(Default)]
pub struct HandlerFuncs {
    add: Option<AddFn>,
    update: Option<UpdateFn>,
    delete: Option<DeleteFn>,
}

impl HandlerFuncs {
    /// Create a handler with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback for added objects.
    pub fn on_add<F>(mut self, f: F) -> Self
    where
        F: Fn(&Object) -> HandlerResult + Send + Sync + 'static,
    {
        self.add = Some(Box::new(f));
        self
    }

    /// Set the callback for modified objects; receives the replaced copy if known.
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Object>, &Object) -> HandlerResult + Send + Sync + 'static,
    {
        self.update = Some(Box::new(f));
        self
    }

    /// Set the callback for deleted objects.
    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: Fn(&Object) -> HandlerResult + Send + Sync + 'static,
    {
        self.delete = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for HandlerFuncs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFuncs")
            .field("add", &self.add.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

impl EventHandler for HandlerFuncs {
    fn on_event(&self, kind: ChangeKind, _key: &ResourceKey, object: &Object) -> HandlerResult {
        match (kind, &self.add, &self.update, &self.delete) {
            (ChangeKind::Added, Some(f), _, _) => f(object),
            (ChangeKind::Modified, _, Some(f), _) => f(None, object),
            (ChangeKind::Deleted, _, _, Some(f)) => f(object),
            _ => Ok(()),
        }
    }

    fn on_delta(&self, delta: &CacheDelta) -> HandlerResult {
        match (delta.kind, &self.update) {
            (ChangeKind::Modified, Some(f)) => f(delta.previous.as_deref(), &delta.object),
            _ => self.on_event(delta.kind, delta.key(), &delta.object),
        }
    }
}

/// Ordered, named set of handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<(String, Arc<dyn EventHandler>)>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Handlers are invoked in registration order.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.push((name.into(), handler));
    }

    /// Move every handler of `other` to the end of this registry.
    pub fn append(&mut self, other: HandlerRegistry) {
        self.handlers.extend(other.handlers);
    }

    /// Number of registered handlers.
    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }

    /// Deliver one delta to every handler, returning one
    /// [`InformerError::Handler`] per handler that failed.
    ///
    /// Stops early, without invoking further handlers, once `stop` fires.
    pub fn dispatch(
        &self,
        delta: &CacheDelta,
        stop: &StopSignal,
        metrics: &InformerMetrics,
    ) -> Vec<InformerError> {
        let mut failures = Vec::new();
        for (name, handler) in &self.handlers {
            if stop.is_stopped() {
                trace!(key = %delta.key(), "stopped, skipping remaining handlers");
                break;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.on_delta(delta)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            let failure = InformerError::Handler {
                handler: name.clone(),
                message,
            };
            metrics.record_handler_failure(name);
            error!(
                key = %delta.key(),
                change = %delta.kind,
                version = %delta.object.version(),
                error = %failure,
                "event handler failed"
            );
            failures.push(failure);
        }
        failures
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
