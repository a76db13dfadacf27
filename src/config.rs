use crate::error::{EchoError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All tunables recognized by the adaptive consistency core (spec §6).
///
/// Mirrors the teacher crate's `ConnectionConfig`/`RuntimeOperationalPolicy`
/// shape: a builder over a plain struct, plus `validate()` and `Default`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EchoConfig {
    /// Cadence of Sampler/Controller ticks.
    pub poll_interval: Duration,
    /// Width of per-object metric windowing.
    pub sample_window: Duration,
    /// Consecutive sampler failures before the sampler-degraded signal fires.
    pub degraded_after_failures: u32,

    /// K consecutive proposals required to commit a transition.
    pub confirmation_count: u32,
    /// Minimum time between committed mode changes per object.
    pub cooldown: Duration,
    /// Partition-risk level triggering override to Available.
    pub emergency_threshold: f64,

    /// Policy scoring factor weights (w_p, w_l, w_w, w_h, w_s).
    pub weight_partition_risk: f64,
    pub weight_replication_lag: f64,
    pub weight_write_rate: f64,
    pub weight_hint: f64,
    pub weight_stability: f64,

    /// Base mode band thresholds; hysteresis widens by ±0.1.
    pub threshold_low: f64,
    pub threshold_high: f64,
    pub hysteresis_margin: f64,

    /// Divisors for factor normalization.
    pub max_lag_ms: f64,
    pub max_write_rate: f64,

    /// Replicas per object.
    pub replication_factor: usize,
    /// Consistent-hash ring granularity.
    pub virtual_nodes_per_worker: usize,

    /// Deadline applied to a single write's replica round-trip.
    pub write_deadline: Duration,

    /// Capped attempts for the asynchronous replica fan-out's retry (spec
    /// §4.5, Available/Hybrid: "bounded retry with exponential backoff,
    /// capped attempts").
    pub async_fanout_max_attempts: u32,
    /// Base delay for the async fan-out's exponential backoff; attempt N
    /// waits `base * 2^(N-1)` before retrying.
    pub async_fanout_base_backoff: Duration,
}

impl EchoConfig {
    /// Builds a config from the spec's stated defaults (§4.3, §4.4, §4.5, §6).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn sample_window(mut self, d: Duration) -> Self {
        self.sample_window = d;
        self
    }

    pub fn confirmation_count(mut self, k: u32) -> Self {
        self.confirmation_count = k;
        self
    }

    pub fn cooldown(mut self, d: Duration) -> Self {
        self.cooldown = d;
        self
    }

    pub fn emergency_threshold(mut self, t: f64) -> Self {
        self.emergency_threshold = t;
        self
    }

    pub fn replication_factor(mut self, r: usize) -> Self {
        self.replication_factor = r;
        self
    }

    pub fn virtual_nodes_per_worker(mut self, n: usize) -> Self {
        self.virtual_nodes_per_worker = n;
        self
    }

    /// Reads the handful of values an operator would plausibly override from
    /// the environment, following the teacher's
    /// `std::env::var(...).ok().and_then(|v| v.parse().ok())` idiom.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = env_u64("ECHOFS_POLL_INTERVAL_MS") {
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("ECHOFS_COOLDOWN_MS") {
            cfg.cooldown = Duration::from_millis(ms);
        }
        if let Some(k) = std::env::var("ECHOFS_CONFIRMATION_COUNT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            cfg.confirmation_count = k;
        }
        if let Some(r) = std::env::var("ECHOFS_REPLICATION_FACTOR")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            cfg.replication_factor = r;
        }
        cfg
    }

    /// Validates cross-field invariants a malformed config could violate.
    pub fn validate(&self) -> Result<()> {
        if self.confirmation_count == 0 {
            return Err(EchoError::InvalidConfig(
                "confirmation_count must be >= 1".into(),
            ));
        }
        if self.replication_factor == 0 {
            return Err(EchoError::InvalidConfig(
                "replication_factor must be >= 1".into(),
            ));
        }
        if self.virtual_nodes_per_worker == 0 {
            return Err(EchoError::InvalidConfig(
                "virtual_nodes_per_worker must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.emergency_threshold) {
            return Err(EchoError::InvalidConfig(
                "emergency_threshold must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold_low)
            || !(0.0..=1.0).contains(&self.threshold_high)
            || self.threshold_low >= self.threshold_high
        {
            return Err(EchoError::InvalidConfig(
                "threshold_low must be < threshold_high, both within [0, 1]".into(),
            ));
        }
        if self.max_lag_ms <= 0.0 || self.max_write_rate <= 0.0 {
            return Err(EchoError::InvalidConfig(
                "normalization divisors must be positive".into(),
            ));
        }
        if self.async_fanout_max_attempts == 0 {
            return Err(EchoError::InvalidConfig(
                "async_fanout_max_attempts must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Quorum size for a Strong write: ⌊R/2⌋ + 1 (a majority; 2 for R=3).
    pub fn strong_quorum(&self) -> usize {
        self.replication_factor / 2 + 1
    }

    /// Size of the synchronous replica set for a Hybrid write: ⌈R/2⌉.
    pub fn hybrid_sync_count(&self) -> usize {
        self.replication_factor.div_ceil(2)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            sample_window: Duration::from_secs(30),
            degraded_after_failures: 3,

            confirmation_count: 3,
            cooldown: Duration::from_secs(30),
            emergency_threshold: 0.8,

            weight_partition_risk: 0.4,
            weight_replication_lag: 0.3,
            weight_write_rate: 0.2,
            weight_hint: 0.1,
            weight_stability: 0.2,

            threshold_low: 0.3,
            threshold_high: 0.6,
            hysteresis_margin: 0.1,

            max_lag_ms: 1000.0,
            max_write_rate: 100.0,

            replication_factor: 3,
            virtual_nodes_per_worker: 100,

            write_deadline: Duration::from_secs(5),

            async_fanout_max_attempts: 5,
            async_fanout_base_backoff: Duration::from_millis(100),
        }
    }
}
