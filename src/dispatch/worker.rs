use crate::error::{EchoError, Result};
use crate::model::ChunkRef;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// External collaborator that actually moves chunk bytes to a worker node
/// (spec §6, "Worker transport"). Production wiring (the network client) is
/// out of scope for this core; callers supply an implementation.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn write_chunk(&self, object_id: &str, chunk: &ChunkRef, payload: &[u8]) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    Healthy,
    Degraded,
}

struct WorkerEntry {
    transport: Arc<dyn WorkerTransport>,
    consecutive_failures: AtomicU32,
}

/// Registry of worker transports, grounded on the teacher's
/// `ConnectionPool`: tracked membership, a stats snapshot for observability,
/// and explicit register/remove in place of the teacher's min/max
/// connection sizing (workers here are long-lived remote peers, not
/// short-lived pooled connections).
pub struct WorkerPool {
    workers: RwLock<HashMap<String, WorkerEntry>>,
    degraded_after_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolStats {
    pub total_workers: usize,
    pub healthy_workers: usize,
}

impl WorkerPool {
    pub fn new(degraded_after_failures: u32) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            degraded_after_failures: degraded_after_failures.max(1),
        }
    }

    pub async fn register_worker(&self, worker_id: impl Into<String>, transport: Arc<dyn WorkerTransport>) {
        let mut workers = self.workers.write().await;
        workers.insert(
            worker_id.into(),
            WorkerEntry {
                transport,
                consecutive_failures: AtomicU32::new(0),
            },
        );
    }

    pub async fn remove_worker(&self, worker_id: &str) {
        self.workers.write().await.remove(worker_id);
    }

    pub async fn transport_for(&self, worker_id: &str) -> Result<Arc<dyn WorkerTransport>> {
        let workers = self.workers.read().await;
        workers
            .get(worker_id)
            .map(|entry| entry.transport.clone())
            .ok_or_else(|| EchoError::TransientRemote(format!("unknown worker '{worker_id}'")))
    }

    /// Records a failed RPC to `worker_id`. Returns true once the worker has
    /// crossed `degraded_after_failures` consecutive failures.
    pub async fn record_failure(&self, worker_id: &str) -> bool {
        let workers = self.workers.read().await;
        match workers.get(worker_id) {
            Some(entry) => {
                let count = entry.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                count >= self.degraded_after_failures
            }
            None => false,
        }
    }

    pub async fn record_success(&self, worker_id: &str) {
        let workers = self.workers.read().await;
        if let Some(entry) = workers.get(worker_id) {
            entry.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    pub async fn health_of(&self, worker_id: &str) -> Option<WorkerHealth> {
        let workers = self.workers.read().await;
        workers.get(worker_id).map(|entry| {
            if entry.consecutive_failures.load(Ordering::SeqCst) >= self.degraded_after_failures {
                WorkerHealth::Degraded
            } else {
                WorkerHealth::Healthy
            }
        })
    }

    pub async fn stats(&self) -> WorkerPoolStats {
        let workers = self.workers.read().await;
        let total_workers = workers.len();
        let healthy_workers = workers
            .values()
            .filter(|entry| entry.consecutive_failures.load(Ordering::SeqCst) < self.degraded_after_failures)
            .count();
        WorkerPoolStats {
            total_workers,
            healthy_workers,
        }
    }
}
