use super::metrics::{ClusterMetrics, MetricsBundle, MetricsSource};
use crate::config::EchoConfig;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// One tick's worth of freshly sampled telemetry, keyed by object id.
pub struct TickMetrics {
    pub per_object: HashMap<String, MetricsBundle>,
    pub cluster: ClusterMetrics,
}

/// Periodic collector of per-object and cluster-wide metrics (spec §4.2).
///
/// Isolates per-object sampling failures from each other and tracks
/// consecutive-failure streaks per object to drive the sampler-degraded
/// signal the Mode Controller consults before acting on a proposal.
pub struct TelemetrySampler<S: MetricsSource> {
    source: Arc<S>,
    config: EchoConfig,
    consecutive_failures: Mutex<HashMap<String, u32>>,
}

impl<S: MetricsSource + 'static> TelemetrySampler<S> {
    pub fn new(source: Arc<S>, config: EchoConfig) -> Self {
        Self {
            source,
            config,
            consecutive_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Runs a single tick over `object_ids`, isolating per-object failures.
    pub async fn tick(&self, object_ids: &[String]) -> TickMetrics {
        let mut per_object = HashMap::with_capacity(object_ids.len());
        let mut failures = self.consecutive_failures.lock().await;

        for object_id in object_ids {
            match self.source.sample_object(object_id).await {
                Ok(bundle) => {
                    failures.insert(object_id.clone(), 0);
                    per_object.insert(object_id.clone(), bundle);
                }
                Err(err) => {
                    let count = failures.entry(object_id.clone()).or_insert(0);
                    *count += 1;
                    warn!(object_id = %object_id, error = %err, consecutive_failures = *count, "telemetry sample failed");
                }
            }
        }

        let cluster = self.source.sample_cluster().await.unwrap_or_else(|err| {
            warn!(error = %err, "cluster telemetry sample failed");
            ClusterMetrics::default()
        });

        debug!(sampled = per_object.len(), requested = object_ids.len(), "sampler tick complete");
        TickMetrics { per_object, cluster }
    }

    /// True once an object has failed sampling on `degraded_after_failures`
    /// consecutive ticks (spec §4.2).
    pub async fn is_degraded(&self, object_id: &str) -> bool {
        let failures = self.consecutive_failures.lock().await;
        failures.get(object_id).copied().unwrap_or(0) >= self.config.degraded_after_failures
    }
}

/// Handle to a background Sampler tick loop, grounded on
/// `persist::runtime::support::worker::RuntimeSnapshotWorker`: a
/// `tokio::select!` over a periodic `sleep` and a `oneshot` stop signal.
pub struct SamplerLoop {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl SamplerLoop {
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SamplerLoop {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            handle.abort();
        }
    }
}

/// Spawns the periodic tick loop, invoking `on_tick` with each batch of
/// freshly sampled metrics.
pub fn spawn_sampler_loop<S, F, Fut>(
    sampler: Arc<TelemetrySampler<S>>,
    list_object_ids: F,
    on_tick: impl Fn(TickMetrics) -> Fut + Send + Sync + 'static,
) -> SamplerLoop
where
    S: MetricsSource + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Vec<String>> + Send,
{
    let poll_interval = sampler.config.poll_interval;
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = sleep(poll_interval) => {
                    let ids = list_object_ids().await;
                    let tick = sampler.tick(&ids).await;
                    on_tick(tick).await;
                }
            }
        }
    });

    SamplerLoop {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
