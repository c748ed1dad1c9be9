//! Resource version tracking.
//!
//! This module provides [`ResourceVersion`], the opaque token a remote store
//! stamps on every object and list response. Versions are never generated
//! locally; they only flow in from store responses.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version identifier for stored resources.
///
/// A version is opaque to clients. The only relation defined on it is the
/// partial order "observed before/after": two versions that both parse as
/// unsigned integers are compared numerically, identical tokens are equal,
/// and anything else is incomparable. An empty version represents the
/// initial state (nothing observed yet).
///
/// # Example
///
/// ```rust
/// use informer_core::ResourceVersion;
///
/// let v1 = ResourceVersion::new("9");
/// let v2 = ResourceVersion::new("10");
/// let empty = ResourceVersion::empty();
///
/// assert!(v1.is_older_than(&v2));
/// assert!(empty.is_empty());
/// assert_eq!(v1.observed_order(&ResourceVersion::new("abc")), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    /// Create a new resource version from a string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Create an empty resource version (initial state).
    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Check if the version is empty (initial state).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Compare two versions by observation order.
    ///
    /// Returns `None` when the tokens cannot be ordered.
    #[must_use]
    pub fn observed_order(&self, other: &Self) -> Option<Ordering> {
        if self.0 == other.0 {
            return Some(Ordering::Equal);
        }
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }

    /// Whether this version was provably observed before `other`.
    #[must_use]
    pub fn is_older_than(&self, other: &Self) -> bool {
        self.observed_order(other) == Some(Ordering::Less)
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResourceVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceVersion {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for ResourceVersion {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl From<ResourceVersion> for String {
    fn from(v: ResourceVersion) -> Self {
        v.0
    }
}

impl AsRef<str> for ResourceVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
