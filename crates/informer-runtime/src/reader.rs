//! Event stream reader: one watch subscription and its lifecycle.
//!
//! A [`WatchSession`] moves through `Open -> Streaming -> Closed(reason)` and
//! is never reused once closed. It turns the raw store stream into ordered
//! [`ChangeEvent`]s and classifies how the stream ended:
//!
//! - expired history (410 / `Expired`) closes with [`CloseReason::Expired`],
//!   meaning the caller must relist rather than resume
//! - the server ending the stream closes with [`CloseReason::Eof`]
//! - transport failures close with [`CloseReason::Error`]
//! - a stop request or explicit [`WatchSession::cancel`] closes with
//!   [`CloseReason::Cancelled`]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::{FutureExt, StreamExt};
use informer_core::{
    ChangeEvent, InformerError, ListSelector, RemoteStore, ResourceVersion, WatchStream,
};
use tracing::{debug, trace, warn};

use crate::shutdown::StopSignal;

/// Unique identifier for a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// Why a session closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The server ended the stream.
    Eof,
    /// The transport failed.
    Error,
    /// The caller cancelled.
    Cancelled,
    /// The starting version is no longer in the server's history.
    Expired,
}

impl CloseReason {
    /// Lowercase label, used for logging and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "eof",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Subscribed, nothing received yet.
    Open,
    /// At least one event received.
    Streaming,
    /// Terminal.
    Closed(CloseReason),
}

/// What to do with events already buffered when cancelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelMode {
    /// Return every event that is ready without waiting.
    Drain,
    /// Drop buffered events.
    Discard,
}

/// One live watch subscription.
pub struct WatchSession {
    id: SessionId,
    from: ResourceVersion,
    last_version: ResourceVersion,
    state: SessionState,
    stream: Option<WatchStream>,
    cancel: StopSignal,
    events: u64,
    last_error: Option<InformerError>,
    opened_at: Instant,
}

impl fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSession")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("last_version", &self.last_version)
            .field("state", &self.state)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

enum Polled {
    Cancelled,
    Item(Option<Result<ChangeEvent, InformerError>>),
}

impl WatchSession {
    /// Open a watch from `from`.
    ///
    /// Never fails: if the watch call itself errors, times out, or is
    /// cancelled, the returned session is already closed with the matching
    /// reason and [`WatchSession::last_error`] holds the cause.
    pub async fn open(
        store: &dyn RemoteStore,
        from: ResourceVersion,
        selector: &ListSelector,
        mut cancel: StopSignal,
        open_timeout: Option<Duration>,
    ) -> Self {
        let id = SessionId::next();
        let mut session = Self {
            id,
            last_version: from.clone(),
            from,
            state: SessionState::Open,
            stream: None,
            cancel: cancel.clone(),
            events: 0,
            last_error: None,
            opened_at: Instant::now(),
        };

        let from = session.from.clone();
        let call = store.watch(&from, selector);
        let result = tokio::select! {
            biased;
            _ = cancel.wait() => {
                session.state = SessionState::Closed(CloseReason::Cancelled);
                return session;
            }
            result = with_deadline(open_timeout, "watch open", call) => result,
        };

        match result {
            Ok(stream) => {
                debug!(session = %id, from = %session.from, "watch opened");
                session.stream = Some(stream);
            }
            Err(err) => {
                let reason = if err.is_expired() {
                    CloseReason::Expired
                } else {
                    CloseReason::Error
                };
                warn!(session = %id, from = %session.from, error = %err, "watch open failed");
                session.state = SessionState::Closed(reason);
                session.last_error = Some(err);
            }
        }
        session
    }

    /// Session identifier.
    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed(_))
    }

    /// Why the session closed, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            SessionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Version the watch started from.
    #[inline]
    pub fn from_version(&self) -> &ResourceVersion {
        &self.from
    }

    /// Version of the last event or bookmark delivered; a resume point.
    #[inline]
    pub fn last_version(&self) -> &ResourceVersion {
        &self.last_version
    }

    /// Number of events delivered.
    #[inline]
    pub fn events_delivered(&self) -> u64 {
        self.events
    }

    /// The error that closed the session, if any.
    pub fn last_error(&self) -> Option<&InformerError> {
        self.last_error.as_ref()
    }

    /// Time since the session was opened.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the session is closed; server-side `Error` events
    /// are consumed here and turn into a close reason, so callers only see
    /// object and bookmark events.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        let polled = {
            let stream = self.stream.as_mut()?;
            let cancel = &mut self.cancel;
            tokio::select! {
                biased;
                _ = cancel.wait() => Polled::Cancelled,
                item = stream.next() => Polled::Item(item),
            }
        };

        match polled {
            Polled::Cancelled => {
                self.close(CloseReason::Cancelled);
                None
            }
            Polled::Item(None) => {
                self.close(CloseReason::Eof);
                None
            }
            Polled::Item(Some(Err(err))) => {
                let reason = if err.is_expired() {
                    CloseReason::Expired
                } else {
                    CloseReason::Error
                };
                warn!(session = %self.id, error = %err, "watch stream failed");
                self.last_error = Some(err);
                self.close(reason);
                None
            }
            Polled::Item(Some(Ok(ChangeEvent::Error(status)))) => {
                let reason = if status.is_expired() {
                    CloseReason::Expired
                } else {
                    CloseReason::Error
                };
                debug!(session = %self.id, status = %status, "watch error event");
                self.last_error = Some(if status.is_expired() {
                    InformerError::Expired {
                        version: self.last_version.clone(),
                    }
                } else {
                    InformerError::StreamClosed {
                        reason: status.message,
                    }
                });
                self.close(reason);
                None
            }
            Polled::Item(Some(Ok(event))) => {
                self.state = SessionState::Streaming;
                self.events += 1;
                if let Some(version) = event.version() {
                    self.last_version = version.clone();
                }
                trace!(session = %self.id, event = event.label(), version = ?event.version(), "watch event");
                Some(event)
            }
        }
    }

    /// Cancel the session.
    ///
    /// With [`CancelMode::Drain`], events the stream already has ready are
    /// returned (up to the first error or end of stream); with
    /// [`CancelMode::Discard`] they are dropped. Either way the session is
    /// closed with [`CloseReason::Cancelled`] afterwards.
    pub fn cancel(&mut self, mode: CancelMode) -> Vec<ChangeEvent> {
        let mut drained = Vec::new();
        if self.is_closed() {
            return drained;
        }

        if let (CancelMode::Drain, Some(stream)) = (mode, self.stream.as_mut()) {
            while let Some(Some(Ok(event))) = stream.next().now_or_never() {
                if matches!(event, ChangeEvent::Error(_)) {
                    break;
                }
                if let Some(version) = event.version() {
                    self.last_version = version.clone();
                }
                self.events += 1;
                drained.push(event);
            }
        }

        self.close(CloseReason::Cancelled);
        drained
    }

    fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }
        self.stream = None;
        self.state = SessionState::Closed(reason);
        debug!(
            session = %self.id,
            reason = %reason,
            events = self.events,
            last_version = %self.last_version,
            "watch closed"
        );
    }
}

/// Await `fut`, failing with [`InformerError::Timeout`] after `deadline`.
pub(crate) async fn with_deadline<T, F>(
    deadline: Option<Duration>,
    operation: &str,
    fut: F,
) -> Result<T, InformerError>
where
    F: std::future::Future<Output = Result<T, InformerError>>,
{
    match deadline {
        Some(d) => tokio::time::timeout(d, fut).await.unwrap_or_else(|_| {
            Err(InformerError::Timeout {
                operation: format!("{operation} after {d:?}"),
            })
        }),
        None => fut.await,
    }
}
