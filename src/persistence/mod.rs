//! Persistence layer for the watch resume checkpoint

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Subscriber name used by the step watch
pub const STEP_WATCH: &str = "step-watch";

/// Trait for checkpoint backends
///
/// A checkpoint is the highest resource version a subscriber has dispatched.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last recorded version for a subscriber
    async fn load(&self, subscriber: &str) -> Result<Option<u64>>;

    /// Record the last dispatched version for a subscriber
    async fn save(&self, subscriber: &str, version: u64) -> Result<()>;
}

/// In-memory checkpoints (for testing or ephemeral use)
pub struct InMemoryCheckpointStore {
    versions: RwLock<HashMap<String, u64>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            versions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, subscriber: &str) -> Result<Option<u64>> {
        let versions = self.versions.read().await;
        Ok(versions.get(subscriber).copied())
    }

    async fn save(&self, subscriber: &str, version: u64) -> Result<()> {
        let mut versions = self.versions.write().await;
        versions.insert(subscriber.to_string(), version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        assert_eq!(store.load(STEP_WATCH).await.unwrap(), None);

        store.save(STEP_WATCH, 12).await.unwrap();
        store.save(STEP_WATCH, 15).await.unwrap();

        assert_eq!(store.load(STEP_WATCH).await.unwrap(), Some(15));
        assert_eq!(store.load("other").await.unwrap(), None);
    }
}
