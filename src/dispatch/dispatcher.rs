use super::replicators::{
    AvailableReplicator, HybridReplicator, ReplicationRequest, Replicator, StrongReplicator,
    WriteOutcome,
};
use super::ring::HashRing;
use super::worker::WorkerPool;
use crate::config::EchoConfig;
use crate::error::{EchoError, Result};
use crate::model::{ChunkRef, Mode, VectorClock};
use crate::store::ObjectStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Routes a write to the replication strategy matching the object's
/// *current* mode at dispatch time (spec §4.5: "the dispatcher always reads
/// the committed mode fresh; it never caches a stale decision").
pub struct ReplicationDispatcher {
    store: Arc<ObjectStore>,
    workers: Arc<WorkerPool>,
    ring: RwLock<HashRing>,
    config: EchoConfig,
    strong: StrongReplicator,
    available: AvailableReplicator,
    hybrid: HybridReplicator,
}

impl ReplicationDispatcher {
    pub fn new(store: Arc<ObjectStore>, workers: Arc<WorkerPool>, config: EchoConfig) -> Self {
        let ring = HashRing::new(config.virtual_nodes_per_worker);
        Self {
            store,
            workers,
            ring: RwLock::new(ring),
            config,
            strong: StrongReplicator,
            available: AvailableReplicator,
            hybrid: HybridReplicator,
        }
    }

    pub async fn add_worker(&self, worker_id: &str) {
        self.ring.write().await.add_worker(worker_id);
    }

    pub async fn remove_worker(&self, worker_id: &str) {
        self.ring.write().await.remove_worker(worker_id);
    }

    pub async fn mark_worker_unhealthy(&self, worker_id: &str) {
        self.ring.write().await.mark_unhealthy(worker_id);
    }

    pub async fn mark_worker_healthy(&self, worker_id: &str) {
        self.ring.write().await.mark_healthy(worker_id);
    }

    /// Dispatches a single chunk write for `object_id`, selecting the
    /// replication strategy from the mode committed in the Object Store at
    /// the moment dispatch begins.
    pub async fn dispatch_write(
        &self,
        object_id: &str,
        chunk: ChunkRef,
        payload: &[u8],
        coordinator_node_id: &str,
        client_observed_clock: Option<VectorClock>,
    ) -> Result<WriteOutcome> {
        let meta = self
            .store
            .get(object_id)
            .await
            .ok_or_else(|| EchoError::UnknownObject(object_id.to_string()))?;

        let replicas = {
            let ring = self.ring.read().await;
            ring.replicas_for(object_id, self.config.replication_factor)
        };

        let request = ReplicationRequest {
            write_id: Uuid::new_v4(),
            object_id,
            chunk,
            payload,
            coordinator_node_id,
            client_observed_clock,
        };

        let now = Utc::now();
        match meta.current_mode {
            Mode::Strong => {
                self.strong
                    .replicate(&self.store, &self.workers, &self.config, &replicas, request, now)
                    .await
            }
            Mode::Available => {
                self.available
                    .replicate(&self.store, &self.workers, &self.config, &replicas, request, now)
                    .await
            }
            Mode::Hybrid => {
                self.hybrid
                    .replicate(&self.store, &self.workers, &self.config, &replicas, request, now)
                    .await
            }
        }
    }
}
