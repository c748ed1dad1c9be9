//! The remote store contract.
//!
//! [`RemoteStore`] is the authoritative side: an API server collection
//! reachable over some transport. Everything in this workspace consumes it
//! through this trait; bootstrapping (endpoints, credentials) is the
//! implementor's concern.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{ChangeEvent, ListSelector, Object, ObjectList, ResourceKey, ResourceVersion, Result};

/// A live watch subscription.
///
/// Yields events until the server ends the stream (`None`) or the transport
/// fails (`Some(Err(_))`).
pub type WatchStream = BoxStream<'static, Result<ChangeEvent>>;

/// How dependents of a deleted object are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PropagationPolicy {
    /// Leave dependents in place.
    Orphan,
    /// Delete the object now, dependents asynchronously.
    #[default]
    Background,
    /// Delete dependents before the object.
    Foreground,
}

impl fmt::Display for PropagationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Orphan => "Orphan",
            Self::Background => "Background",
            Self::Foreground => "Foreground",
        };
        f.write_str(s)
    }
}

/// Trait for an authoritative, versioned resource collection.
///
/// Implementations must be safe to share between synchronizer workers and
/// concurrent mutators.
#[async_trait]
pub trait RemoteStore: Send + Sync + fmt::Debug {
    /// List objects in scope, with the collection version they were read at.
    async fn list(&self, selector: &ListSelector) -> Result<ObjectList>;

    /// Open a watch delivering every change after `from`.
    async fn watch(&self, from: &ResourceVersion, selector: &ListSelector) -> Result<WatchStream>;

    /// Fetch a single object.
    ///
    /// Fails with [`crate::InformerError::NotFound`] if absent.
    async fn get(&self, key: &ResourceKey) -> Result<Object>;

    /// Create an object; the returned copy carries the assigned version.
    ///
    /// Fails with [`crate::InformerError::AlreadyExists`] if the key is taken.
    async fn create(&self, object: Object) -> Result<Object>;

    /// Replace an object if its stored version still equals `expected`.
    ///
    /// Fails with [`crate::InformerError::Conflict`] when `expected` is stale
    /// and [`crate::InformerError::NotFound`] when the object was deleted.
    async fn update(&self, object: Object, expected: &ResourceVersion) -> Result<Object>;

    /// Delete an object.
    ///
    /// Fails with [`crate::InformerError::NotFound`] if already absent.
    async fn delete(&self, key: &ResourceKey, propagation: PropagationPolicy) -> Result<()>;
}

/// Shared handle to a remote store.
pub type SharedStore = Arc<dyn RemoteStore>;
