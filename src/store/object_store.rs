use crate::error::{EchoError, Result};
use crate::hash::stable_shard_for;
use crate::model::{Mode, ObjectMetadata};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const DEFAULT_SHARD_COUNT: usize = 16;

/// The single point of authority for an object's current mode (spec §4.1).
///
/// Sharded N-ways over `tokio::sync::RwLock`-guarded maps, generalizing the
/// teacher's `InMemoryStorage` (one `RwLock` per table) to fine-grained
/// per-object locking: unrelated objects never block on each other's writes.
pub struct ObjectStore {
    shards: Vec<RwLock<HashMap<String, ObjectMetadata>>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }

    pub fn with_shard_count(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    fn shard_for(&self, object_id: &str) -> &RwLock<HashMap<String, ObjectMetadata>> {
        &self.shards[stable_shard_for(object_id, self.shards.len())]
    }

    /// Returns an independent snapshot copy (invariant 5: external holders
    /// cannot mutate shared state).
    pub async fn get(&self, object_id: &str) -> Option<ObjectMetadata> {
        let shard = self.shard_for(object_id).read().await;
        shard.get(object_id).cloned()
    }

    /// Overwrites by object id, taking a snapshot of `record` on write.
    pub async fn put(&self, record: ObjectMetadata) {
        let mut shard = self.shard_for(&record.object_id).write().await;
        shard.insert(record.object_id.clone(), record);
    }

    /// Inserts only if absent; used by the first-write path.
    pub async fn register(&self, record: ObjectMetadata) -> Result<()> {
        let mut shard = self.shard_for(&record.object_id).write().await;
        if shard.contains_key(&record.object_id) {
            return Err(EchoError::ObjectExists(record.object_id));
        }
        shard.insert(record.object_id.clone(), record);
        Ok(())
    }

    /// Privileged mutation of `current_mode`/`last_mode_change` only.
    /// Only the Mode Controller is expected to call this (spec §3, §4.1).
    /// Tags the transition "manual_override"; callers that have a proper
    /// policy-derived reason should call `update_mode_with_reason` instead.
    pub async fn update_mode(
        &self,
        object_id: &str,
        mode: Mode,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.update_mode_with_reason(object_id, mode, "manual_override", timestamp)
            .await
    }

    /// Privileged mutation of `current_mode`/`last_mode_change`/the
    /// transition's reason tag (spec §3, §4.1, §6's "Get Mode" reason tag).
    pub async fn update_mode_with_reason(
        &self,
        object_id: &str,
        mode: Mode,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let mut shard = self.shard_for(object_id).write().await;
        let record = shard
            .get_mut(object_id)
            .ok_or_else(|| EchoError::UnknownObject(object_id.to_string()))?;
        record.current_mode = mode;
        record.last_mode_change = timestamp;
        record.last_mode_change_reason = reason.into();
        record.updated_at = timestamp;
        Ok(())
    }

    /// Updates the operator/user-declared mode hint (spec §3). Does not
    /// itself change `current_mode`; the next Mode Controller tick reacts to
    /// the new hint.
    pub async fn set_hint(&self, object_id: &str, hint: crate::model::ModeHint) -> Result<()> {
        let mut shard = self.shard_for(object_id).write().await;
        let record = shard
            .get_mut(object_id)
            .ok_or_else(|| EchoError::UnknownObject(object_id.to_string()))?;
        record.mode_hint = hint;
        Ok(())
    }

    /// Applies a write-path mutation (version, vector clock, chunks,
    /// timestamps) produced by the Replication Dispatcher.
    pub async fn apply_write<F>(&self, object_id: &str, mutate: F) -> Result<ObjectMetadata>
    where
        F: FnOnce(&mut ObjectMetadata),
    {
        let mut shard = self.shard_for(object_id).write().await;
        let record = shard
            .get_mut(object_id)
            .ok_or_else(|| EchoError::UnknownObject(object_id.to_string()))?;
        mutate(record);
        Ok(record.clone())
    }

    pub async fn delete(&self, object_id: &str) -> bool {
        let mut shard = self.shard_for(object_id).write().await;
        shard.remove(object_id).is_some()
    }

    pub async fn list_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for shard in &self.shards {
            let guard = shard.read().await;
            ids.extend(guard.keys().cloned());
        }
        ids
    }

    pub async fn list_by_mode(&self, mode: Mode) -> Vec<String> {
        let mut ids = Vec::new();
        for shard in &self.shards {
            let guard = shard.read().await;
            ids.extend(
                guard
                    .values()
                    .filter(|record| record.current_mode == mode)
                    .map(|record| record.object_id.clone()),
            );
        }
        ids
    }

    pub async fn count(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    /// Snapshots every live object, used by the Sampler to enumerate objects
    /// per tick without holding any single lock for the whole iteration.
    pub async fn snapshot_all(&self) -> Vec<ObjectMetadata> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.read().await;
            out.extend(guard.values().cloned());
        }
        out
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> ObjectMetadata {
        ObjectMetadata::new(id, 1024, Utc::now())
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();
        let got = store.get("obj-1").await.unwrap();
        assert_eq!(got.object_id, "obj-1");
    }

    #[tokio::test]
    async fn register_is_rejected_if_present() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();
        let err = store.register(sample("obj-1")).await.unwrap_err();
        assert!(matches!(err, EchoError::ObjectExists(_)));
    }

    #[tokio::test]
    async fn get_returns_snapshot_isolated_from_later_mutation() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();

        let mut snap = store.get("obj-1").await.unwrap();
        snap.size = 99999;

        let fresh = store.get("obj-1").await.unwrap();
        assert_eq!(fresh.size, 1024);
    }

    #[tokio::test]
    async fn update_mode_mutates_only_mode_fields() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();
        let now = Utc::now();
        store.update_mode("obj-1", Mode::Available, now).await.unwrap();

        let got = store.get("obj-1").await.unwrap();
        assert_eq!(got.current_mode, Mode::Available);
        assert_eq!(got.last_mode_change, now);
    }

    #[tokio::test]
    async fn update_mode_on_unknown_object_errors() {
        let store = ObjectStore::new();
        let err = store
            .update_mode("ghost", Mode::Available, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EchoError::UnknownObject(_)));
    }

    #[tokio::test]
    async fn list_by_mode_filters_correctly() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();
        store.register(sample("obj-2")).await.unwrap();
        store
            .update_mode("obj-2", Mode::Available, Utc::now())
            .await
            .unwrap();

        let strong = store.list_by_mode(Mode::Strong).await;
        let available = store.list_by_mode(Mode::Available).await;
        assert_eq!(strong, vec!["obj-1".to_string()]);
        assert_eq!(available, vec!["obj-2".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();
        assert!(store.delete("obj-1").await);
        assert!(store.get("obj-1").await.is_none());
        assert!(!store.delete("obj-1").await);
    }

    #[tokio::test]
    async fn count_and_list_ids_reflect_registrations() {
        let store = ObjectStore::new();
        for i in 0..20 {
            store.register(sample(&format!("obj-{i}"))).await.unwrap();
        }
        assert_eq!(store.count().await, 20);
        assert_eq!(store.list_ids().await.len(), 20);
    }

    #[tokio::test]
    async fn set_hint_updates_hint_without_touching_mode() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();
        store
            .set_hint("obj-1", crate::model::ModeHint::Available)
            .await
            .unwrap();

        let got = store.get("obj-1").await.unwrap();
        assert_eq!(got.mode_hint, crate::model::ModeHint::Available);
        assert_eq!(got.current_mode, Mode::Strong);
    }

    #[tokio::test]
    async fn apply_write_advances_version_via_closure() {
        let store = ObjectStore::new();
        store.register(sample("obj-1")).await.unwrap();
        let updated = store
            .apply_write("obj-1", |record| {
                record.last_version += 1;
                record.vector_clock.increment("n1");
            })
            .await
            .unwrap();
        assert_eq!(updated.last_version, 1);
        assert_eq!(updated.vector_clock.get("n1"), 1);
    }
}
