//! Resource store client
//!
//! The store is the source of truth for steps, stages and pipelines. The
//! controller only relies on the primitives below: list, get, apply (which
//! bumps the resource version) and watch from a version. Resources cross this
//! boundary as JSON documents; [`ResourceClient`] layers typed access on top.

pub mod client;
pub mod memory;

pub use client::ResourceClient;
pub use memory::InMemoryResourceStore;

use crate::core::ResourceKind;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by the resource store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {uuid} not found")]
    NotFound { kind: ResourceKind, uuid: String },

    #[error("Failed to decode {kind}: {source}")]
    Decode {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {kind}: {source}")]
    Encode {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} {uuid} was modified: expected version {expected}, stored {actual}")]
    Conflict {
        kind: ResourceKind,
        uuid: String,
        expected: u64,
        actual: u64,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// The write was based on a stale read
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Equality filter over dotted JSON paths, e.g. `spec.stage_uuid`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the value at `path` to equal `value`
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    /// Check whether a stored document satisfies every condition
    pub fn matches(&self, object: &Value) -> bool {
        self.conditions.iter().all(|(path, expected)| {
            let pointer = format!("/{}", path.replace('.', "/"));
            object.pointer(&pointer) == Some(expected)
        })
    }
}

/// Pagination window; a limit of 0 means no limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Result of an apply
#[derive(Debug, Clone)]
pub struct Applied {
    /// The document as stored, carrying its new version
    pub object: Value,

    /// Whether the resource did not exist before
    pub created: bool,
}

/// A change notification from a watch
///
/// An event with an empty identity is a heartbeat and carries no resource.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub uuid: String,
    pub object: Value,
}

impl WatchEvent {
    pub fn heartbeat() -> Self {
        Self {
            uuid: String::new(),
            object: Value::Null,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.uuid.is_empty()
    }
}

/// Stream of watch events; closes when the store ends the watch
pub type WatchStream = mpsc::UnboundedReceiver<WatchEvent>;

/// Versioned resource store primitives
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List resources of a kind matching a filter
    async fn list(
        &self,
        namespace: &str,
        kind: ResourceKind,
        filter: &Filter,
        page: Page,
    ) -> Result<Vec<Value>, StoreError>;

    /// Fetch one resource by identity
    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        uuid: &str,
    ) -> Result<Value, StoreError>;

    /// List every resource of a kind matching a filter
    async fn list_by_filter(
        &self,
        namespace: &str,
        kind: ResourceKind,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError> {
        self.list(namespace, kind, filter, Page::all()).await
    }

    /// Create or replace a resource, bumping its version
    ///
    /// A body carrying a non-zero `metadata.version` is a compare-and-swap:
    /// it is rejected with [`StoreError::Conflict`] unless that version is
    /// still the stored one. A body at version 0 writes unconditionally.
    async fn apply(
        &self,
        namespace: &str,
        kind: ResourceKind,
        uuid: &str,
        object: Value,
    ) -> Result<Applied, StoreError>;

    /// Stream every change with a version strictly greater than `from_version`
    async fn watch(
        &self,
        namespace: &str,
        kind: ResourceKind,
        from_version: u64,
    ) -> Result<WatchStream, StoreError>;
}

/// Version recorded in a stored document
pub fn version_of(object: &Value) -> u64 {
    object
        .pointer("/metadata/version")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}
