//! List/watch scoping.

use std::collections::BTreeMap;

use crate::Object;

/// Restricts a list or watch to a namespace and/or a set of labels.
///
/// An empty selector matches everything.
///
/// # Example
///
/// ```rust
/// use informer_core::{ListSelector, Object, ResourceKey};
/// use serde_json::Value;
///
/// let selector = ListSelector::namespace("default").with_label("app", "demo");
/// let obj = Object::new(ResourceKey::namespaced("default", "a"), Value::Null)
///     .with_label("app", "demo");
/// assert!(selector.matches(&obj));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListSelector {
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
}

impl ListSelector {
    /// Selector matching every object.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Selector matching objects in a single namespace.
    #[must_use]
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            labels: BTreeMap::new(),
        }
    }

    /// Require a label value.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Namespace scope, if any.
    #[inline]
    pub fn namespace_scope(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Required labels.
    #[inline]
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Check whether an object is in scope.
    pub fn matches(&self, object: &Object) -> bool {
        if let Some(ns) = &self.namespace {
            if object.key().namespace() != Some(ns.as_str()) {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| object.labels().get(k) == Some(v))
    }
}
