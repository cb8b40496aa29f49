//! Typed access to the resource store

use crate::core::Resource;
use crate::store::{Filter, Page, ResourceStore, StoreError, WatchStream};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Namespace-scoped, typed view over a [`ResourceStore`]
#[derive(Clone)]
pub struct ResourceClient {
    store: Arc<dyn ResourceStore>,
    namespace: String,
}

impl ResourceClient {
    pub fn new(store: Arc<dyn ResourceStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// List every resource of a kind
    ///
    /// Documents that fail to decode are logged and skipped.
    pub async fn list<T: Resource>(&self) -> Result<Vec<T>, StoreError> {
        let values = self
            .store
            .list(&self.namespace, T::KIND, &Filter::new(), Page::all())
            .await?;
        Ok(Self::decode_all(values))
    }

    /// List resources of a kind matching a filter
    pub async fn list_by_filter<T: Resource>(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let values = self
            .store
            .list_by_filter(&self.namespace, T::KIND, filter)
            .await?;
        Ok(Self::decode_all(values))
    }

    /// Fetch a resource, mapping "not found" to `None`
    pub async fn get<T: Resource>(&self, uuid: &str) -> Result<Option<T>, StoreError> {
        match self.store.get(&self.namespace, T::KIND, uuid).await {
            Ok(value) => Self::decode(value).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist a resource and return it as stored, with its bumped version
    ///
    /// A resource read from the store carries its version, so writing it back
    /// fails with [`StoreError::Conflict`] if it changed in between.
    pub async fn apply<T: Resource>(&self, resource: &T) -> Result<T, StoreError> {
        let object = serde_json::to_value(resource).map_err(|source| StoreError::Encode {
            kind: T::KIND,
            source,
        })?;
        let applied = self
            .store
            .apply(&self.namespace, T::KIND, resource.uuid(), object)
            .await?;
        Self::decode(applied.object)
    }

    /// Watch a kind for changes after `from_version`
    pub async fn watch<T: Resource>(&self, from_version: u64) -> Result<WatchStream, StoreError> {
        self.store.watch(&self.namespace, T::KIND, from_version).await
    }

    /// Decode a raw store document
    pub fn decode<T: Resource>(value: Value) -> Result<T, StoreError> {
        serde_json::from_value(value).map_err(|source| StoreError::Decode {
            kind: T::KIND,
            source,
        })
    }

    fn decode_all<T: Resource>(values: Vec<Value>) -> Vec<T> {
        values
            .into_iter()
            .filter_map(|value| match Self::decode::<T>(value) {
                Ok(resource) => Some(resource),
                Err(e) => {
                    warn!("[store] skipping undecodable {}: {}", T::KIND, e);
                    None
                }
            })
            .collect()
    }
}
