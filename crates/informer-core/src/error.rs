//! Error types for informer operations.
//!
//! [`InformerError`] covers every failure a list, watch, or mutation can
//! produce. Variants fall into two groups: those a retry can make progress on
//! (transport failures, conflicts within budget, expired watches) and those
//! that must be surfaced to the caller (not found, exhausted, timed out).

use crate::{ResourceKey, ResourceVersion};

/// Comprehensive error type for informer operations.
///
/// # Example
///
/// ```rust
/// use informer_core::{InformerError, ResourceKey};
///
/// let err = InformerError::NotFound {
///     key: ResourceKey::namespaced("default", "web"),
/// };
/// assert!(err.is_not_found());
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum InformerError {
    /// The object does not exist in the remote store.
    #[error("resource not found: {key}")]
    NotFound {
        /// Key of the missing resource.
        key: ResourceKey,
    },

    /// An object with the same key already exists.
    #[error("resource already exists: {key}")]
    AlreadyExists {
        /// Key of the existing resource.
        key: ResourceKey,
    },

    /// Optimistic concurrency check failed on update.
    #[error("version conflict for {key}: expected {expected}, current {current}")]
    Conflict {
        /// Key of the contended resource.
        key: ResourceKey,
        /// Version the caller expected to replace.
        expected: ResourceVersion,
        /// Version currently stored.
        current: ResourceVersion,
    },

    /// The requested watch position is older than the retained history.
    #[error("resource version expired: {version}")]
    Expired {
        /// The version that can no longer be resumed from.
        version: ResourceVersion,
    },

    /// Network-level failure talking to the remote store.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A watch stream terminated.
    #[error("stream closed: {reason}")]
    StreamClosed {
        /// Reason for stream closure.
        reason: String,
    },

    /// The mutation retry budget was spent on conflicts.
    #[error("gave up on {key} after {attempts} conflicting attempts: {last}")]
    ConflictExhausted {
        /// Key of the contended resource.
        key: ResourceKey,
        /// Number of attempts made.
        attempts: u32,
        /// The last conflict observed.
        #[source]
        last: Box<InformerError>,
    },

    /// A deadline was exceeded.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An event handler failed. Isolated per handler, never propagated by the synchronizer.
    #[error("handler {handler} failed: {message}")]
    Handler {
        /// Handler name.
        handler: String,
        /// Failure description.
        message: String,
    },

    /// An object failed validation.
    #[error("invalid object {key}: {reason}")]
    InvalidObject {
        /// Key of the offending object.
        key: ResourceKey,
        /// Reason for the failure.
        reason: String,
    },

    /// The synchronizer has been stopped.
    #[error("synchronizer stopped")]
    Stopped,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl InformerError {
    /// Create a transport error from any error type.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error without an underlying cause.
    pub fn transport_msg(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error from any error type.
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this is an optimistic concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether the object was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the watch position expired and a full relist is required.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    /// Whether retrying the same operation can make progress.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::StreamClosed { .. } | Self::Conflict { .. }
        )
    }
}
