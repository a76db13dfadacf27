use crate::config::EchoConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Per-object telemetry gathered by a single Sampler tick (spec §4.2).
///
/// Any field may be `None` ("unknown"); normalization into worst/best-case
/// defaults happens in `normalize`, not here, so the raw bundle stays a
/// faithful record of what the metrics source actually returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsBundle {
    /// Estimated probability of network partition affecting this object's
    /// replicas, in [0, 1].
    pub partition_risk: Option<f64>,
    /// Elapsed time from a write on the primary to its visibility on the
    /// slowest in-sync replica.
    pub replication_lag: Option<Duration>,
    /// Writes per second over the sample window.
    pub write_rate: Option<f64>,
    /// Current RTT per worker node id.
    pub node_round_trip: HashMap<String, Duration>,
}

/// `MetricsBundle` with every field resolved to a concrete value, ready for
/// the Policy Engine's scoring function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedMetrics {
    pub partition_risk: f64,
    pub lag_ms: f64,
    pub write_rate: f64,
    pub avg_node_rtt_ms: Option<f64>,
}

impl MetricsBundle {
    /// Resolves unknown fields per spec §4.2: 0.5 for probabilities, the
    /// configured normalization ceiling for lag (worst case), 0 for rate
    /// (best case). Node round-trip is cluster-wide (spec §4.2: "node
    /// round-trip — mapping from worker node id to current RTT", supplied
    /// alongside the per-object fields on the same tick); this object's own
    /// `node_round_trip` is consulted first in case a source supplies a
    /// per-object view, falling back to the cluster-wide reading.
    pub fn normalize(&self, cluster: &ClusterMetrics, cfg: &EchoConfig) -> NormalizedMetrics {
        let partition_risk = self.partition_risk.unwrap_or(0.5).clamp(0.0, 1.0);
        let lag_ms = self
            .replication_lag
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(cfg.max_lag_ms);
        let write_rate = self.write_rate.unwrap_or(0.0);
        let rtt_source = if self.node_round_trip.is_empty() {
            &cluster.node_round_trip
        } else {
            &self.node_round_trip
        };
        let avg_node_rtt_ms = if rtt_source.is_empty() {
            None
        } else {
            let total_ms: f64 = rtt_source.values().map(|d| d.as_secs_f64() * 1000.0).sum();
            Some(total_ms / rtt_source.len() as f64)
        };

        NormalizedMetrics {
            partition_risk,
            lag_ms,
            write_rate,
            avg_node_rtt_ms,
        }
    }
}

/// Cluster-wide metrics gathered alongside per-object bundles (spec §4.2).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterMetrics {
    pub node_round_trip: HashMap<String, Duration>,
}

/// External collaborator supplying telemetry (spec §6, "Metrics source").
///
/// Implemented by callers; production wiring (the actual metrics pipeline)
/// is out of scope for this core (spec §1).
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetches a fresh metrics bundle for one object. A per-object failure
    /// must not prevent sampling of others (spec §4.2).
    async fn sample_object(&self, object_id: &str) -> Result<MetricsBundle>;

    /// Fetches cluster-wide metrics (per-worker RTT).
    async fn sample_cluster(&self) -> Result<ClusterMetrics>;
}
