//! Resource identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::InformerError;

/// Identity of a resource within one collection.
///
/// Either a `(namespace, name)` pair or a cluster-scoped name. Keys display
/// and parse in the `namespace/name` form used by API servers.
///
/// # Example
///
/// ```rust
/// use informer_core::ResourceKey;
///
/// let key: ResourceKey = "kube-system/coredns".parse().unwrap();
/// assert_eq!(key.namespace(), Some("kube-system"));
/// assert_eq!(key.name(), "coredns");
///
/// let node = ResourceKey::cluster_scoped("worker-1");
/// assert_eq!(node.to_string(), "worker-1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    namespace: Option<String>,
    name: String,
}

impl ResourceKey {
    /// Key for a namespaced resource.
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped resource.
    #[must_use]
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Namespace, if the resource is namespaced.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Resource name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the resource is cluster-scoped.
    #[inline]
    #[must_use]
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_none()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for ResourceKey {
    type Err = InformerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| InformerError::InvalidObject {
            key: Self::cluster_scoped(s),
            reason: reason.to_string(),
        };

        match s.split_once('/') {
            Some((ns, name)) => {
                if ns.is_empty() || name.is_empty() {
                    return Err(invalid("namespace and name must be non-empty"));
                }
                if name.contains('/') {
                    return Err(invalid("key has more than one separator"));
                }
                Ok(Self::namespaced(ns, name))
            }
            None if s.is_empty() => Err(invalid("name must be non-empty")),
            None => Ok(Self::cluster_scoped(s)),
        }
    }
}
