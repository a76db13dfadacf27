use async_trait::async_trait;
use chrono::Utc;
use echofs_core::{
    ChunkRef, EchoConfig, EchoError, Mode, ObjectMetadata, ObjectStore, ReplicationDispatcher,
    Result as EchoResult, WorkerPool, WorkerTransport,
};
use std::sync::Arc;

struct AlwaysOk;

#[async_trait]
impl WorkerTransport for AlwaysOk {
    async fn write_chunk(&self, _object_id: &str, _chunk: &ChunkRef, _payload: &[u8]) -> EchoResult<()> {
        Ok(())
    }
    async fn health_check(&self) -> EchoResult<()> {
        Ok(())
    }
}

struct AlwaysFails;

#[async_trait]
impl WorkerTransport for AlwaysFails {
    async fn write_chunk(&self, _object_id: &str, _chunk: &ChunkRef, _payload: &[u8]) -> EchoResult<()> {
        Err(EchoError::TransientRemote("simulated".into()))
    }
    async fn health_check(&self) -> EchoResult<()> {
        Err(EchoError::TransientRemote("simulated".into()))
    }
}

async fn dispatcher_with(workers: Vec<(&str, bool)>, replication_factor: usize) -> (ReplicationDispatcher, Arc<ObjectStore>) {
    let store = Arc::new(ObjectStore::new());
    let pool = Arc::new(WorkerPool::new(3));
    let cfg = EchoConfig::default().replication_factor(replication_factor);
    let dispatcher = ReplicationDispatcher::new(store.clone(), pool.clone(), cfg);

    for (worker_id, healthy) in workers {
        let transport: Arc<dyn WorkerTransport> = if healthy {
            Arc::new(AlwaysOk)
        } else {
            Arc::new(AlwaysFails)
        };
        pool.register_worker(worker_id, transport).await;
        dispatcher.add_worker(worker_id).await;
    }

    (dispatcher, store)
}

fn chunk() -> ChunkRef {
    ChunkRef {
        chunk_id: "chunk-0".into(),
        index: 0,
    }
}

#[tokio::test]
async fn strong_mode_requires_majority_quorum_to_succeed() {
    let (dispatcher, store) = dispatcher_with(vec![("w1", true), ("w2", false), ("w3", false)], 3).await;
    store
        .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
        .await
        .unwrap();

    // Strong quorum for R=3 is 2; only one healthy worker available.
    let err = dispatcher
        .dispatch_write("obj-1", chunk(), b"payload", "coord-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EchoError::InsufficientReplicas { .. }));
}

#[tokio::test]
async fn strong_mode_commits_once_quorum_is_met() {
    let (dispatcher, store) = dispatcher_with(vec![("w1", true), ("w2", true), ("w3", false)], 3).await;
    store
        .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
        .await
        .unwrap();

    let outcome = dispatcher
        .dispatch_write("obj-1", chunk(), b"payload", "coord-1", None)
        .await
        .unwrap();
    assert_eq!(outcome.mode, Mode::Strong);
    assert_eq!(outcome.synced_replicas.len(), 2);
    assert_eq!(outcome.version, 1);
}

#[tokio::test]
async fn available_mode_succeeds_as_long_as_primary_is_healthy() {
    let (dispatcher, store) = dispatcher_with(vec![("w1", true), ("w2", false), ("w3", false)], 3).await;
    store
        .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
        .await
        .unwrap();
    store
        .update_mode("obj-1", Mode::Available, Utc::now())
        .await
        .unwrap();

    let outcome = dispatcher
        .dispatch_write("obj-1", chunk(), b"payload", "coord-1", None)
        .await
        .unwrap();
    assert_eq!(outcome.mode, Mode::Available);
    assert_eq!(outcome.synced_replicas.len(), 1);
}

#[tokio::test]
async fn hybrid_mode_splits_replicas_between_sync_and_async_sets() {
    let (dispatcher, store) = dispatcher_with(
        vec![("w1", true), ("w2", true), ("w3", true), ("w4", true), ("w5", true)],
        5,
    )
    .await;
    store
        .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
        .await
        .unwrap();
    store
        .update_mode("obj-1", Mode::Hybrid, Utc::now())
        .await
        .unwrap();

    let outcome = dispatcher
        .dispatch_write("obj-1", chunk(), b"payload", "coord-1", None)
        .await
        .unwrap();
    assert_eq!(outcome.mode, Mode::Hybrid);
    // hybrid_sync_count for R=5 is 3.
    assert_eq!(outcome.synced_replicas.len(), 3);
    assert_eq!(outcome.pending_replicas.len(), 2);
}

#[tokio::test]
async fn worker_marked_unhealthy_is_excluded_from_replica_selection() {
    let (dispatcher, store) = dispatcher_with(vec![("w1", true), ("w2", true), ("w3", true)], 3).await;
    store
        .register(ObjectMetadata::new("obj-1", 0, Utc::now()))
        .await
        .unwrap();

    dispatcher.mark_worker_unhealthy("w1").await;
    dispatcher.mark_worker_unhealthy("w2").await;

    // Only one healthy worker ("w3") remains, below the R=3 strong quorum of 2.
    let err = dispatcher
        .dispatch_write("obj-1", chunk(), b"payload", "coord-1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EchoError::InsufficientReplicas { .. }));
}
