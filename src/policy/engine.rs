use crate::config::EchoConfig;
use crate::model::{Mode, ModeHint, ObjectMetadata};
use crate::telemetry::NormalizedMetrics;
use chrono::{DateTime, Utc};
use std::fmt;

/// Deterministic tag explaining why a target mode was proposed (spec §4.3
/// point 5), chosen by the first matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    UserHintAvailable,
    UserHintStrong,
    HighPartitionRisk,
    HighReplicationLag,
    HighWriteRate,
    StabilityPenalty,
    LowLatency,
    HighLatency,
    PolicyEvaluation,
    /// Set only by the Mode Controller's emergency bypass (spec §4.4), never
    /// by `PolicyEngine::evaluate` itself.
    EmergencyOverride,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            TransitionReason::UserHintAvailable => "user_hint_available",
            TransitionReason::UserHintStrong => "user_hint_strong",
            TransitionReason::HighPartitionRisk => "high_partition_risk",
            TransitionReason::HighReplicationLag => "high_replication_lag",
            TransitionReason::HighWriteRate => "high_write_rate",
            TransitionReason::StabilityPenalty => "stability_penalty",
            TransitionReason::LowLatency => "low_latency",
            TransitionReason::HighLatency => "high_latency",
            TransitionReason::PolicyEvaluation => "policy_evaluation",
            TransitionReason::EmergencyOverride => "emergency_override",
        };
        f.write_str(tag)
    }
}

/// The Policy Engine's output for one object on one tick (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyDecision {
    pub target: Mode,
    pub reason: TransitionReason,
    pub score: f64,
}

/// Stateless, deterministic classifier (spec §4.3): `(metadata, metrics,
/// state) -> target mode + reason`. No I/O; `now` is an explicit argument so
/// the engine is trivially unit-testable without a clock or runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        meta: &ObjectMetadata,
        metrics: &NormalizedMetrics,
        current_mode: Mode,
        now: DateTime<Utc>,
        cfg: &EchoConfig,
    ) -> PolicyDecision {
        let hint_value = hint_value(meta.mode_hint);
        let recent_change_penalty = recent_change_penalty(meta.last_mode_change, now);

        let raw_score = cfg.weight_partition_risk * metrics.partition_risk
            + cfg.weight_replication_lag * (metrics.lag_ms / cfg.max_lag_ms).min(1.0)
            + cfg.weight_write_rate * (metrics.write_rate / cfg.max_write_rate).min(1.0)
            + cfg.weight_hint * hint_value
            - cfg.weight_stability * recent_change_penalty;
        let score = raw_score.clamp(0.0, 1.0);

        let low_threshold = if current_mode == Mode::Available {
            cfg.threshold_low - cfg.hysteresis_margin
        } else {
            cfg.threshold_low
        };
        let high_threshold = if current_mode == Mode::Strong {
            cfg.threshold_high + cfg.hysteresis_margin
        } else {
            cfg.threshold_high
        };

        let target = if score > high_threshold {
            Mode::Available
        } else if score < low_threshold {
            Mode::Strong
        } else {
            Mode::Hybrid
        };

        let reason = classify_reason(meta.mode_hint, metrics, recent_change_penalty);

        PolicyDecision {
            target,
            reason,
            score,
        }
    }
}

fn hint_value(hint: ModeHint) -> f64 {
    match hint {
        ModeHint::Available => 1.0,
        ModeHint::Strong => 0.0,
        ModeHint::Auto => 0.5,
    }
}

/// 1.0 within 60s of the last committed change, linearly decaying to 0.0 by
/// 300s, 0.0 thereafter (spec §4.3 point 3).
fn recent_change_penalty(last_change: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed_secs = now.signed_duration_since(last_change).num_milliseconds() as f64 / 1000.0;
    if elapsed_secs <= 60.0 {
        1.0
    } else if elapsed_secs >= 300.0 {
        0.0
    } else {
        1.0 - (elapsed_secs - 60.0) / (300.0 - 60.0)
    }
}

fn classify_reason(
    hint: ModeHint,
    metrics: &NormalizedMetrics,
    recent_change_penalty: f64,
) -> TransitionReason {
    if hint == ModeHint::Available {
        return TransitionReason::UserHintAvailable;
    }
    if hint == ModeHint::Strong {
        return TransitionReason::UserHintStrong;
    }
    if metrics.partition_risk > 0.7 {
        return TransitionReason::HighPartitionRisk;
    }
    if metrics.lag_ms > 500.0 {
        return TransitionReason::HighReplicationLag;
    }
    if metrics.write_rate > 50.0 {
        return TransitionReason::HighWriteRate;
    }
    if recent_change_penalty > 0.5 {
        return TransitionReason::StabilityPenalty;
    }
    if let Some(rtt) = metrics.avg_node_rtt_ms {
        if rtt < 10.0 {
            return TransitionReason::LowLatency;
        }
        if rtt > 100.0 {
            return TransitionReason::HighLatency;
        }
    }
    TransitionReason::PolicyEvaluation
}
