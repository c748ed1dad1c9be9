//! Versioned resource objects.
//!
//! An [`Object`] pairs identity and version metadata with an opaque JSON
//! payload. The payload layout belongs to the resource type and is never
//! interpreted by the cache or synchronizer; the nested-field helpers exist
//! so mutation transforms can edit unstructured payloads by path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{InformerError, ResourceKey, ResourceVersion, Result};

/// A resource as stored by the remote store.
///
/// # Example
///
/// ```rust
/// use informer_core::{Object, ResourceKey};
/// use serde_json::json;
///
/// let mut obj = Object::new(
///     ResourceKey::namespaced("default", "demo"),
///     json!({"spec": {"replicas": 2}}),
/// );
/// obj.set_nested(&["spec", "replicas"], json!(1)).unwrap();
/// assert_eq!(obj.get_nested(&["spec", "replicas"]), Some(&json!(1)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Object {
    key: ResourceKey,
    #[serde(default)]
    version: ResourceVersion,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    data: Value,
}

impl Object {
    /// Create an object with no version (not yet stored).
    #[must_use]
    pub fn new(key: ResourceKey, data: Value) -> Self {
        Self {
            key,
            version: ResourceVersion::empty(),
            labels: BTreeMap::new(),
            data,
        }
    }

    /// Set the version. Only remote stores should stamp versions.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<ResourceVersion>) -> Self {
        self.version = version.into();
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Get the resource key.
    #[inline]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Get the resource version.
    #[inline]
    pub fn version(&self) -> &ResourceVersion {
        &self.version
    }

    /// Replace the resource version.
    pub fn set_version(&mut self, version: ResourceVersion) {
        self.version = version;
    }

    /// Get the labels.
    #[inline]
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Mutable access to the labels.
    #[inline]
    pub fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.labels
    }

    /// Get the payload.
    #[inline]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Mutable access to the payload.
    #[inline]
    pub fn data_mut(&mut self) -> &mut Value {
        &mut self.data
    }

    /// Consume and return the payload.
    pub fn into_data(self) -> Value {
        self.data
    }

    /// Look up a value by map path.
    pub fn get_nested(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.data, |value, segment| value.as_object()?.get(*segment))
    }

    /// Set a value by map path, creating intermediate maps.
    ///
    /// # Errors
    ///
    /// Returns [`InformerError::InvalidObject`] if the path is empty or a
    /// non-map value sits where a map is needed.
    pub fn set_nested(&mut self, path: &[&str], value: Value) -> Result<()> {
        let key = &self.key;
        let Some((last, parents)) = path.split_last() else {
            return Err(invalid(key, "empty field path".to_string()));
        };

        if self.data.is_null() {
            self.data = Value::Object(Map::new());
        }

        let mut current = &mut self.data;
        for (depth, segment) in parents.iter().enumerate() {
            let map = match current {
                Value::Object(map) => map,
                _ => return Err(not_a_map(key, &path[..depth])),
            };
            current = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        match current {
            Value::Object(map) => {
                map.insert((*last).to_string(), value);
                Ok(())
            }
            _ => Err(not_a_map(key, parents)),
        }
    }
}

fn invalid(key: &ResourceKey, reason: String) -> InformerError {
    InformerError::InvalidObject {
        key: key.clone(),
        reason,
    }
}

fn not_a_map(key: &ResourceKey, at: &[&str]) -> InformerError {
    let at = if at.is_empty() {
        "<root>".to_string()
    } else {
        at.join(".")
    };
    invalid(key, format!("value at {at} is not a map"))
}

/// The result of a list call: objects plus the collection version they were read at.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectList {
    /// Listed objects, in store order.
    pub items: Vec<Object>,
    /// Collection version to start a watch from.
    pub version: ResourceVersion,
}

impl ObjectList {
    /// Create a list response.
    #[must_use]
    pub fn new(items: Vec<Object>, version: impl Into<ResourceVersion>) -> Self {
        Self {
            items,
            version: version.into(),
        }
    }

    /// Number of listed objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
