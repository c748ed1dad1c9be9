//! Watch change events.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Object, ResourceKey, ResourceVersion};

/// Kind of change delivered to event handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The object appeared.
    Added,
    /// The object changed.
    Modified,
    /// The object was removed.
    Deleted,
}

impl ChangeKind {
    /// Lowercase label, used for logging and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to a watch error event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusReason {
    /// The requested version is older than the server's retained history.
    Expired,
    /// The server gave up on the watch (timeout, shutdown, overload).
    ServerTimeout,
    /// Anything else.
    InternalError,
}

/// Status payload of a watch error event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStatus {
    /// Numeric status code (410 for expired history).
    pub code: u16,
    /// Machine-readable reason.
    pub reason: StatusReason,
    /// Human-readable message.
    pub message: String,
}

impl WatchStatus {
    /// Status for a watch whose starting version has been compacted away.
    #[must_use]
    pub fn expired(version: &ResourceVersion) -> Self {
        Self {
            code: 410,
            reason: StatusReason::Expired,
            message: format!("too old resource version: {version}"),
        }
    }

    /// Status for any other server-side watch failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            reason: StatusReason::InternalError,
            message: message.into(),
        }
    }

    /// Whether this status means the watch position is gone and a relist is required.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.reason == StatusReason::Expired || self.code == 410
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}: {}", self.code, self.reason, self.message)
    }
}

/// One event on a watch stream.
///
/// Events for the same key arrive in the order the server applied them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// A new object.
    Added(Object),
    /// An updated object.
    Modified(Object),
    /// A removed object, carrying its last known state.
    Deleted(Object),
    /// A version watermark with no object change.
    Bookmark(ResourceVersion),
    /// A server-reported watch failure.
    Error(WatchStatus),
}

impl ChangeEvent {
    /// The object carried by this event, if any.
    pub fn object(&self) -> Option<&Object> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => Some(obj),
            Self::Bookmark(_) | Self::Error(_) => None,
        }
    }

    /// The key this event applies to, if any.
    pub fn key(&self) -> Option<&ResourceKey> {
        self.object().map(Object::key)
    }

    /// The version this event advances the stream to, if any.
    pub fn version(&self) -> Option<&ResourceVersion> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => Some(obj.version()),
            Self::Bookmark(v) => Some(v),
            Self::Error(_) => None,
        }
    }

    /// The handler-facing kind, for object-carrying events.
    pub fn kind(&self) -> Option<ChangeKind> {
        match self {
            Self::Added(_) => Some(ChangeKind::Added),
            Self::Modified(_) => Some(ChangeKind::Modified),
            Self::Deleted(_) => Some(ChangeKind::Deleted),
            Self::Bookmark(_) | Self::Error(_) => None,
        }
    }

    /// Short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
            Self::Bookmark(_) => "bookmark",
            Self::Error(_) => "error",
        }
    }
}
