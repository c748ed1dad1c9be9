//! # informer-core
//!
//! Core types, traits, and error handling for watch-driven resource caches.
//!
//! This crate provides the foundational types used across all other informer crates:
//!
//! - [`InformerError`] - Error taxonomy for list/watch/mutation failures
//! - [`ResourceKey`] - Namespaced or cluster-scoped resource identity
//! - [`ResourceVersion`] - Opaque server-assigned version token
//! - [`Object`] - A versioned resource with an opaque JSON payload
//! - [`ChangeEvent`] - Watch event variants (added, modified, deleted, bookmark, error)
//! - [`RemoteStore`] - The list/watch/get/update/delete contract of the API server
//!
//! ## Example
//!
//! ```rust
//! use informer_core::{ResourceKey, ResourceVersion};
//!
//! let key = ResourceKey::namespaced("default", "demo-deployment");
//! assert_eq!(key.to_string(), "default/demo-deployment");
//!
//! let v1 = ResourceVersion::new("41");
//! let v2 = ResourceVersion::new("42");
//! assert!(v1.is_older_than(&v2));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod event;
mod key;
mod object;
mod selector;
mod store;
mod version;

pub use error::InformerError;
pub use event::{ChangeEvent, ChangeKind, StatusReason, WatchStatus};
pub use key::ResourceKey;
pub use object::{Object, ObjectList};
pub use selector::ListSelector;
pub use store::{PropagationPolicy, RemoteStore, SharedStore, WatchStream};
pub use version::ResourceVersion;

/// Result type alias using [`InformerError`].
pub type Result<T> = std::result::Result<T, InformerError>;

/// Alias for Result used in signatures shared with downstream crates.
pub type InformerResult<T> = Result<T>;
