//! In-memory resource store (for tests and local runs)

use crate::core::ResourceKind;
use crate::store::{
    version_of, Applied, Filter, Page, ResourceStore, StoreError, WatchEvent, WatchStream,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};

type Key = (String, ResourceKind, String);

struct Watcher {
    namespace: String,
    kind: ResourceKind,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    /// Store-wide revision; every apply takes the next one
    revision: u64,
    objects: HashMap<Key, Value>,
    watchers: Vec<Watcher>,
}

/// Versioned, watchable store held in memory
///
/// Versions come from a single store-wide counter, so they strictly increase
/// across all resources and "the highest version seen" is a valid resume
/// point for any kind.
#[derive(Default)]
pub struct InMemoryResourceStore {
    inner: Mutex<Inner>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current store revision
    pub async fn revision(&self) -> u64 {
        self.inner.lock().await.revision
    }

    /// Send a heartbeat to every open watch
    pub async fn heartbeat(&self) {
        let mut inner = self.inner.lock().await;
        inner
            .watchers
            .retain(|w| w.tx.send(WatchEvent::heartbeat()).is_ok());
    }

    /// End every open watch; receivers observe a closed stream
    pub async fn close_watches(&self) {
        self.inner.lock().await.watchers.clear();
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn list(
        &self,
        namespace: &str,
        kind: ResourceKind,
        filter: &Filter,
        page: Page,
    ) -> Result<Vec<Value>, StoreError> {
        let inner = self.inner.lock().await;
        let mut matched: Vec<&Value> = inner
            .objects
            .iter()
            .filter(|((ns, k, _), object)| ns == namespace && *k == kind && filter.matches(object))
            .map(|(_, object)| object)
            .collect();
        matched.sort_by_key(|object| version_of(object));

        let limit = if page.limit == 0 { usize::MAX } else { page.limit };
        Ok(matched
            .into_iter()
            .skip(page.offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        namespace: &str,
        kind: ResourceKind,
        uuid: &str,
    ) -> Result<Value, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .objects
            .get(&(namespace.to_string(), kind, uuid.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                uuid: uuid.to_string(),
            })
    }

    async fn apply(
        &self,
        namespace: &str,
        kind: ResourceKind,
        uuid: &str,
        mut object: Value,
    ) -> Result<Applied, StoreError> {
        if uuid.is_empty() {
            return Err(StoreError::Backend(format!("cannot apply {kind} without an identity")));
        }
        if !object.is_object() {
            return Err(StoreError::Backend(format!("{kind} {uuid} is not a JSON object")));
        }

        let expected = version_of(&object);
        let key = (namespace.to_string(), kind, uuid.to_string());

        let mut inner = self.inner.lock().await;
        if expected != 0 {
            let actual = inner.objects.get(&key).map(version_of).unwrap_or(0);
            if actual != expected {
                return Err(StoreError::Conflict {
                    kind,
                    uuid: uuid.to_string(),
                    expected,
                    actual,
                });
            }
        }
        inner.revision += 1;
        let version = inner.revision;

        if let Some(fields) = object.as_object_mut() {
            let metadata = fields.entry("metadata").or_insert_with(|| json!({}));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert("uuid".to_string(), json!(uuid));
                metadata.insert("version".to_string(), json!(version));
            }
        }

        let created = inner.objects.insert(key, object.clone()).is_none();

        let event = WatchEvent {
            uuid: uuid.to_string(),
            object: object.clone(),
        };
        inner.watchers.retain(|w| {
            if w.namespace != namespace || w.kind != kind {
                return true;
            }
            w.tx.send(event.clone()).is_ok()
        });

        Ok(Applied { object, created })
    }

    async fn watch(
        &self,
        namespace: &str,
        kind: ResourceKind,
        from_version: u64,
    ) -> Result<WatchStream, StoreError> {
        let mut inner = self.inner.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay under the same lock that registers the watcher: no apply can
        // slip between the two, so nothing after `from_version` is missed.
        let mut backlog: Vec<(&Key, &Value)> = inner
            .objects
            .iter()
            .filter(|((ns, k, _), object)| {
                ns == namespace && *k == kind && version_of(object) > from_version
            })
            .collect();
        backlog.sort_by_key(|(_, object)| version_of(object));
        for ((_, _, uuid), object) in backlog {
            // The receiver is still in scope, so this cannot fail
            let _ = tx.send(WatchEvent {
                uuid: uuid.clone(),
                object: object.clone(),
            });
        }

        inner.watchers.push(Watcher {
            namespace: namespace.to_string(),
            kind,
            tx,
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(uuid: &str, stage: &str, status: &str) -> Value {
        json!({
            "metadata": {"uuid": uuid},
            "spec": {"stage_uuid": stage, "type": "CI", "step_status": status}
        })
    }

    #[tokio::test]
    async fn test_apply_bumps_store_wide_version() {
        let store = InMemoryResourceStore::new();

        let first = store
            .apply("ns", ResourceKind::Step, "a", step("a", "s", "Initializing"))
            .await
            .unwrap();
        let second = store
            .apply("ns", ResourceKind::Stage, "s", json!({"spec": {"pipeline_uuid": "p"}}))
            .await
            .unwrap();
        let third = store
            .apply("ns", ResourceKind::Step, "a", step("a", "s", "Sending"))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!third.created);
        assert_eq!(version_of(&first.object), 1);
        assert_eq!(version_of(&second.object), 2);
        assert_eq!(version_of(&third.object), 3);
        assert_eq!(second.object["metadata"]["uuid"], "s");
    }

    #[tokio::test]
    async fn test_apply_over_stale_version_conflicts() {
        let store = InMemoryResourceStore::new();
        let read = store
            .apply("ns", ResourceKind::Step, "a", step("a", "s", "Initializing"))
            .await
            .unwrap()
            .object;

        // Someone else moves the step on first
        let mut finished = read.clone();
        finished["spec"]["step_status"] = json!("Finish");
        store.apply("ns", ResourceKind::Step, "a", finished).await.unwrap();

        let mut sending = read;
        sending["spec"]["step_status"] = json!("Sending");
        let err = store.apply("ns", ResourceKind::Step, "a", sending).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get("ns", ResourceKind::Step, "a").await.unwrap();
        assert_eq!(stored["spec"]["step_status"], "Finish");
        assert_eq!(version_of(&stored), 2);

        // A versioned body for something that does not exist is stale too
        let ghost = json!({"metadata": {"uuid": "g", "version": 7}, "spec": {}});
        let err = store.apply("ns", ResourceKind::Step, "g", ghost).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryResourceStore::new();
        let err = store.get("ns", ResourceKind::Stage, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_is_scoped_filtered_and_paged() {
        let store = InMemoryResourceStore::new();
        store.apply("ns", ResourceKind::Step, "a", step("a", "s1", "Finish")).await.unwrap();
        store.apply("ns", ResourceKind::Step, "b", step("b", "s1", "Sending")).await.unwrap();
        store.apply("ns", ResourceKind::Step, "c", step("c", "s1", "Finish")).await.unwrap();
        store.apply("other", ResourceKind::Step, "d", step("d", "s1", "Finish")).await.unwrap();

        let finished = store
            .list_by_filter(
                "ns",
                ResourceKind::Step,
                &Filter::new().eq("spec.stage_uuid", "s1").eq("spec.step_status", "Finish"),
            )
            .await
            .unwrap();
        assert_eq!(finished.len(), 2);

        let page = store
            .list("ns", ResourceKind::Step, &Filter::new(), Page { offset: 1, limit: 1 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0]["metadata"]["uuid"], "b");
    }

    #[tokio::test]
    async fn test_watch_replays_then_streams() {
        let store = InMemoryResourceStore::new();
        store.apply("ns", ResourceKind::Step, "a", step("a", "s", "Initializing")).await.unwrap();
        store.apply("ns", ResourceKind::Step, "b", step("b", "s", "Initializing")).await.unwrap();

        let mut rx = store.watch("ns", ResourceKind::Step, 1).await.unwrap();
        store.apply("ns", ResourceKind::Stage, "s", json!({"spec": {}})).await.unwrap();
        store.apply("ns", ResourceKind::Step, "a", step("a", "s", "Sending")).await.unwrap();

        let replayed = rx.recv().await.unwrap();
        assert_eq!(replayed.uuid, "b");
        let live = rx.recv().await.unwrap();
        assert_eq!(live.uuid, "a");
        assert_eq!(version_of(&live.object), 4);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_and_close() {
        let store = InMemoryResourceStore::new();
        let mut rx = store.watch("ns", ResourceKind::Step, 0).await.unwrap();

        store.heartbeat().await;
        assert!(rx.recv().await.unwrap().is_heartbeat());

        store.close_watches().await;
        assert!(rx.recv().await.is_none());
    }
}
