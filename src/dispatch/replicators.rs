use super::worker::WorkerPool;
use crate::config::EchoConfig;
use crate::error::{EchoError, Result};
use crate::model::{ChunkRef, ClockOrdering, Mode, VectorClock};
use crate::store::ObjectStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One write request fanned out to an object's replica set (spec §4.5).
pub struct ReplicationRequest<'a> {
    /// Correlates this attempt across the parallel replica fan-out and the
    /// resulting `WriteOutcome` in logs, the way the teacher crate threads a
    /// `uuid::Uuid` through its runtime command/journal path.
    pub write_id: Uuid,
    pub object_id: &'a str,
    pub chunk: ChunkRef,
    pub payload: &'a [u8],
    pub coordinator_node_id: &'a str,
    /// The vector clock the caller last observed, if any. Used only to
    /// detect a concurrent write (spec §4.5, §7); it is never rejected, only
    /// flagged via `ObjectMetadata::conflict`.
    pub client_observed_clock: Option<VectorClock>,
}

/// Result of driving one write through its mode's replication strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub write_id: Uuid,
    pub version: u64,
    pub mode: Mode,
    pub synced_replicas: Vec<String>,
    pub pending_replicas: Vec<String>,
    pub conflict: bool,
}

/// Strategy for fanning a write out to an object's replica set, selected by
/// the object's current consistency mode (spec §4.5).
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn replicate(
        &self,
        store: &ObjectStore,
        workers: &Arc<WorkerPool>,
        config: &EchoConfig,
        replicas: &[String],
        request: ReplicationRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome>;
}

async fn write_to_worker(
    workers: &WorkerPool,
    worker_id: &str,
    object_id: &str,
    chunk: &ChunkRef,
    payload: &[u8],
    deadline: std::time::Duration,
) -> Result<()> {
    let transport = workers.transport_for(worker_id).await?;
    let result = tokio::time::timeout(deadline, transport.write_chunk(object_id, chunk, payload)).await;
    match result {
        Ok(Ok(())) => {
            workers.record_success(worker_id).await;
            Ok(())
        }
        Ok(Err(err)) => {
            workers.record_failure(worker_id).await;
            Err(err)
        }
        Err(_) => {
            workers.record_failure(worker_id).await;
            Err(EchoError::DeadlineExceeded)
        }
    }
}

/// Advances an object's version and vector clock, merging in the client's
/// observed clock and flagging a conflict if it was concurrent with the
/// store's prior state.
async fn advance_version(
    store: &ObjectStore,
    object_id: &str,
    coordinator_node_id: &str,
    client_observed_clock: Option<&VectorClock>,
    chunk: ChunkRef,
    now: DateTime<Utc>,
) -> Result<(u64, bool)> {
    let mut conflict = false;
    let mut conflicting_version = None;

    let updated = store
        .apply_write(object_id, |record| {
            if let Some(client_clock) = client_observed_clock {
                if record.vector_clock.compare(client_clock) == ClockOrdering::Concurrent {
                    conflict = true;
                    conflicting_version = Some(record.last_version);
                }
                record.vector_clock.merge(client_clock);
            }
            record.vector_clock.increment(coordinator_node_id);
            record.last_version += 1;
            record.chunks.push(chunk);
            record.updated_at = now;
            if conflict {
                record.conflict = true;
                record.conflicting_version = conflicting_version;
            }
        })
        .await?;

    Ok((updated.last_version, conflict))
}

/// Strong (C): synchronous writes to every replica, requiring at least a
/// majority quorum to succeed before acknowledging the write.
pub struct StrongReplicator;

#[async_trait]
impl Replicator for StrongReplicator {
    async fn replicate(
        &self,
        store: &ObjectStore,
        workers: &Arc<WorkerPool>,
        config: &EchoConfig,
        replicas: &[String],
        request: ReplicationRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let required = config.strong_quorum();
        // Strong requires a full replica set of size R to even attempt the
        // write (spec §4.5 "Replica selection"): fewer than R healthy
        // workers means the set can't be formed, distinct from the
        // post-fan-out quorum-of-acks check below.
        if replicas.len() < config.replication_factor {
            return Err(EchoError::InsufficientReplicas {
                required: config.replication_factor,
                available: replicas.len(),
            });
        }

        // Fan out to every replica in parallel (spec §4.5): the quorum wait
        // is on the slowest acknowledging replica, not the sum of all of them.
        debug!(write_id = %request.write_id, object_id = %request.object_id, replicas = replicas.len(), "fanning out strong write");
        let attempts = futures::future::join_all(replicas.iter().map(|worker_id| {
            write_to_worker(
                workers,
                worker_id,
                request.object_id,
                &request.chunk,
                request.payload,
                config.write_deadline,
            )
        }))
        .await;

        let mut synced = Vec::new();
        let mut pending = Vec::new();
        for (worker_id, result) in replicas.iter().zip(attempts) {
            match result {
                Ok(()) => synced.push(worker_id.clone()),
                Err(err) => {
                    warn!(write_id = %request.write_id, worker_id = %worker_id, error = %err, "strong write to replica failed");
                    pending.push(worker_id.clone());
                }
            }
        }

        if synced.len() < required {
            return Err(EchoError::InsufficientReplicas {
                required,
                available: synced.len(),
            });
        }

        let (version, conflict) = advance_version(
            store,
            request.object_id,
            request.coordinator_node_id,
            request.client_observed_clock.as_ref(),
            request.chunk,
            now,
        )
        .await?;

        store
            .apply_write(request.object_id, |record| {
                record.last_sync_timestamp = Some(now);
            })
            .await?;

        Ok(WriteOutcome {
            write_id: request.write_id,
            version,
            mode: Mode::Strong,
            synced_replicas: synced,
            pending_replicas: pending,
            conflict,
        })
    }
}

/// Available (A): synchronous write to the primary only, fire-and-forget
/// async fan-out to the rest of the replica set.
pub struct AvailableReplicator;

#[async_trait]
impl Replicator for AvailableReplicator {
    async fn replicate(
        &self,
        store: &ObjectStore,
        workers: &Arc<WorkerPool>,
        config: &EchoConfig,
        replicas: &[String],
        request: ReplicationRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let primary = replicas
            .first()
            .ok_or_else(|| EchoError::InsufficientReplicas {
                required: 1,
                available: 0,
            })?;

        write_to_worker(
            workers,
            primary,
            request.object_id,
            &request.chunk,
            request.payload,
            config.write_deadline,
        )
        .await?;

        let (version, conflict) = advance_version(
            store,
            request.object_id,
            request.coordinator_node_id,
            request.client_observed_clock.as_ref(),
            request.chunk.clone(),
            now,
        )
        .await?;

        let stragglers: Vec<String> = replicas[1..].to_vec();
        spawn_best_effort_fanout(
            workers.clone(),
            request.write_id,
            Arc::new(request.chunk),
            request.payload.to_vec(),
            request.object_id.to_string(),
            stragglers.clone(),
            config.write_deadline,
            config.async_fanout_max_attempts,
            config.async_fanout_base_backoff,
        );

        Ok(WriteOutcome {
            write_id: request.write_id,
            version,
            mode: Mode::Available,
            synced_replicas: vec![primary.clone()],
            pending_replicas: stragglers,
            conflict,
        })
    }
}

/// Hybrid: synchronous writes to a minority of replicas, async fan-out to
/// the rest (spec §4.5).
pub struct HybridReplicator;

#[async_trait]
impl Replicator for HybridReplicator {
    async fn replicate(
        &self,
        store: &ObjectStore,
        workers: &Arc<WorkerPool>,
        config: &EchoConfig,
        replicas: &[String],
        request: ReplicationRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let sync_count = config.hybrid_sync_count().min(replicas.len());
        if sync_count == 0 {
            return Err(EchoError::InsufficientReplicas {
                required: 1,
                available: 0,
            });
        }
        let (sync_set, async_set) = replicas.split_at(sync_count);

        let mut synced = Vec::new();
        for worker_id in sync_set {
            write_to_worker(
                workers,
                worker_id,
                request.object_id,
                &request.chunk,
                request.payload,
                config.write_deadline,
            )
            .await?;
            synced.push(worker_id.clone());
        }

        let (version, conflict) = advance_version(
            store,
            request.object_id,
            request.coordinator_node_id,
            request.client_observed_clock.as_ref(),
            request.chunk.clone(),
            now,
        )
        .await?;

        let stragglers: Vec<String> = async_set.to_vec();
        spawn_best_effort_fanout(
            workers.clone(),
            request.write_id,
            Arc::new(request.chunk),
            request.payload.to_vec(),
            request.object_id.to_string(),
            stragglers.clone(),
            config.write_deadline,
            config.async_fanout_max_attempts,
            config.async_fanout_base_backoff,
        );

        Ok(WriteOutcome {
            write_id: request.write_id,
            version,
            mode: Mode::Hybrid,
            synced_replicas: synced,
            pending_replicas: stragglers,
            conflict,
        })
    }
}

/// Detaches the Available/Hybrid asynchronous replica propagation from the
/// caller's write (spec §4.5: "enqueue asynchronous propagation... with
/// bounded retry (exponential backoff, capped attempts)"). A straggler that
/// exhausts its attempts is left behind for worker-health degradation and a
/// subsequent replication-lag telemetry reading to surface, never as a
/// failure of the original write.
fn spawn_best_effort_fanout(
    workers: Arc<WorkerPool>,
    write_id: Uuid,
    chunk: Arc<ChunkRef>,
    payload: Vec<u8>,
    object_id: String,
    worker_ids: Vec<String>,
    deadline: std::time::Duration,
    max_attempts: u32,
    base_backoff: std::time::Duration,
) {
    if worker_ids.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let tasks = worker_ids.into_iter().map(|worker_id| {
            let workers = workers.clone();
            let chunk = chunk.clone();
            let payload = payload.clone();
            let object_id = object_id.clone();
            async move {
                for attempt in 1..=max_attempts {
                    match write_to_worker(&workers, &worker_id, &object_id, &chunk, &payload, deadline).await {
                        Ok(()) => {
                            debug!(write_id = %write_id, worker_id = %worker_id, attempt, "async replica propagation succeeded");
                            return;
                        }
                        Err(err) if attempt < max_attempts => {
                            warn!(write_id = %write_id, worker_id = %worker_id, attempt, error = %err, "async replica propagation attempt failed, retrying");
                            tokio::time::sleep(base_backoff * 2u32.saturating_pow(attempt - 1)).await;
                        }
                        Err(err) => {
                            warn!(write_id = %write_id, worker_id = %worker_id, attempt, error = %err, "async replica propagation exhausted retry budget");
                        }
                    }
                }
            }
        });
        futures::future::join_all(tasks).await;
    });
}
