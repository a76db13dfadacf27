use crate::config::EchoConfig;
use crate::error::{EchoError, Result};
use crate::hash::stable_shard_for;
use crate::model::{ControllerState, Mode, ObjectModeState};
use crate::policy::{PolicyEngine, TransitionReason};
use crate::store::ObjectStore;
use crate::telemetry::NormalizedMetrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

const DEFAULT_SHARD_COUNT: usize = 16;

/// What happened to one object on one controller tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerOutcome {
    /// Proposal matches the committed mode; no confirmation in progress.
    Unchanged,
    /// A transition is being confirmed; `count` proposals toward `target` so far.
    Pending { target: Mode, count: u32 },
    /// The object's mode was committed to the Object Store.
    Committed {
        previous: Mode,
        new: Mode,
        reason: TransitionReason,
    },
}

/// Drives the per-object consistency-mode state machine (spec §4.4).
///
/// Wraps the pure `PolicyEngine` with the stateful hysteresis machinery:
/// K-confirmation before committing a transition, a cooldown enforced
/// between committed changes, and an emergency override that bypasses both
/// when partition risk crosses `emergency_threshold`. Per-object state is
/// sharded the same way as the Object Store, generalizing the teacher's
/// single-map-per-table locking to fine-grained per-object locks.
pub struct ModeController {
    store: Arc<ObjectStore>,
    engine: PolicyEngine,
    config: EchoConfig,
    shards: Vec<RwLock<HashMap<String, ObjectModeState>>>,
}

impl ModeController {
    pub fn new(store: Arc<ObjectStore>, config: EchoConfig) -> Self {
        Self::with_shard_count(store, config, DEFAULT_SHARD_COUNT)
    }

    pub fn with_shard_count(store: Arc<ObjectStore>, config: EchoConfig, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self {
            store,
            engine: PolicyEngine::new(),
            config,
            shards,
        }
    }

    fn shard_for(&self, object_id: &str) -> &RwLock<HashMap<String, ObjectModeState>> {
        &self.shards[stable_shard_for(object_id, self.shards.len())]
    }

    /// Runs one controller tick for a single object: scores it, advances its
    /// confirmation state, and commits a transition if due.
    pub async fn evaluate_object(
        &self,
        object_id: &str,
        metrics: &NormalizedMetrics,
        now: DateTime<Utc>,
    ) -> Result<ControllerOutcome> {
        let meta = self
            .store
            .get(object_id)
            .await
            .ok_or_else(|| EchoError::UnknownObject(object_id.to_string()))?;

        let mut shard = self.shard_for(object_id).write().await;
        let state = shard
            .entry(object_id.to_string())
            .or_insert_with(|| ObjectModeState::new(meta.current_mode, now));

        // The Object Store's committed mode is authoritative; if it moved
        // out from under us (e.g. direct operator action) re-sync.
        if state.committed_mode != meta.current_mode {
            state.committed_mode = meta.current_mode;
            state.state = ControllerState::Steady;
        }

        if metrics.partition_risk >= self.config.emergency_threshold
            && state.committed_mode != Mode::Available
        {
            let previous = state.committed_mode;
            self.store
                .update_mode_with_reason(
                    object_id,
                    Mode::Available,
                    TransitionReason::EmergencyOverride.to_string(),
                    now,
                )
                .await?;
            state.committed_mode = Mode::Available;
            state.state = ControllerState::Steady;
            state.last_change = now;
            info!(object_id, ?previous, reason = %TransitionReason::EmergencyOverride, "mode committed");
            return Ok(ControllerOutcome::Committed {
                previous,
                new: Mode::Available,
                reason: TransitionReason::EmergencyOverride,
            });
        }

        let decision = self
            .engine
            .evaluate(&meta, metrics, state.committed_mode, now, &self.config);

        if decision.target == state.committed_mode {
            state.state = ControllerState::Steady;
            return Ok(ControllerOutcome::Unchanged);
        }

        let count = match state.state {
            ControllerState::Pending { target, count } if target == decision.target => count + 1,
            _ => 1,
        };

        if count < self.config.confirmation_count {
            state.state = ControllerState::Pending {
                target: decision.target,
                count,
            };
            return Ok(ControllerOutcome::Pending {
                target: decision.target,
                count,
            });
        }

        let elapsed = now.signed_duration_since(state.last_change);
        let cooldown = chrono::Duration::from_std(self.config.cooldown)
            .unwrap_or_else(|_| chrono::Duration::zero());
        if elapsed < cooldown {
            // Confirmed but still cooling down: hold at the confirmed count,
            // waiting for the cooldown window to pass.
            state.state = ControllerState::Pending {
                target: decision.target,
                count,
            };
            return Ok(ControllerOutcome::Pending {
                target: decision.target,
                count,
            });
        }

        let previous = state.committed_mode;
        self.store
            .update_mode_with_reason(object_id, decision.target, decision.reason.to_string(), now)
            .await?;
        state.committed_mode = decision.target;
        state.state = ControllerState::Steady;
        state.last_change = now;
        info!(object_id, ?previous, new = ?decision.target, reason = %decision.reason, "mode committed");
        Ok(ControllerOutcome::Committed {
            previous,
            new: decision.target,
            reason: decision.reason,
        })
    }

    /// Snapshot of the confirmation state held for `object_id`, if any.
    pub async fn state_of(&self, object_id: &str) -> Option<ObjectModeState> {
        let shard = self.shard_for(object_id).read().await;
        shard.get(object_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectMetadata;

    // Scales lag_ms/write_rate with partition_risk so a risk of 0.95 clears
    // even the Strong-sticky threshold (0.7); a risk of 0.0 stays well under 0.3.
    fn metrics(partition_risk: f64) -> NormalizedMetrics {
        NormalizedMetrics {
            partition_risk,
            lag_ms: partition_risk * 1000.0,
            write_rate: partition_risk * 100.0,
            avg_node_rtt_ms: Some(50.0),
        }
    }

    // Registered 10 minutes in the past so the stability penalty never
    // muddies these assertions.
    async fn controller_with_object(object_id: &str, cfg: EchoConfig) -> (Arc<ObjectStore>, ModeController) {
        let store = Arc::new(ObjectStore::new());
        store
            .register(ObjectMetadata::new(
                object_id,
                0,
                Utc::now() - chrono::Duration::minutes(10),
            ))
            .await
            .unwrap();
        let controller = ModeController::new(store.clone(), cfg);
        (store, controller)
    }

    #[tokio::test]
    async fn matching_proposal_with_committed_mode_is_unchanged() {
        let (_store, controller) = controller_with_object("obj-1", EchoConfig::default()).await;
        let now = Utc::now();
        // partition_risk 0.5 with all else zero keeps the score inside the
        // Hybrid band while the committed mode is Strong... so use a very
        // low-risk read that keeps target == Strong.
        let outcome = controller.evaluate_object("obj-1", &metrics(0.0), now).await.unwrap();
        assert_eq!(outcome, ControllerOutcome::Unchanged);
    }

    #[tokio::test]
    async fn confirmation_count_gates_commit() {
        let mut cfg = EchoConfig::default();
        cfg.confirmation_count = 3;
        cfg.cooldown = std::time::Duration::from_secs(0);
        cfg.emergency_threshold = 0.99;
        let (_store, controller) = controller_with_object("obj-1", cfg).await;

        // High partition risk proposes Available on every tick.
        let now = Utc::now();
        let m = metrics(0.95);

        let first = controller.evaluate_object("obj-1", &m, now).await.unwrap();
        assert_eq!(first, ControllerOutcome::Pending { target: Mode::Available, count: 1 });

        let second = controller.evaluate_object("obj-1", &m, now).await.unwrap();
        assert_eq!(second, ControllerOutcome::Pending { target: Mode::Available, count: 2 });

        let third = controller.evaluate_object("obj-1", &m, now).await.unwrap();
        assert_eq!(
            third,
            ControllerOutcome::Committed {
                previous: Mode::Strong,
                new: Mode::Available,
                reason: TransitionReason::HighPartitionRisk,
            }
        );
    }

    #[tokio::test]
    async fn cooldown_blocks_commit_until_window_passes() {
        let mut cfg = EchoConfig::default();
        cfg.confirmation_count = 1;
        cfg.cooldown = std::time::Duration::from_secs(60);
        cfg.emergency_threshold = 0.99;
        let (_store, controller) = controller_with_object("obj-1", cfg).await;

        let t0 = Utc::now() - chrono::Duration::minutes(5);
        // Commit once to set last_change, bypassing cooldown via emergency path is
        // avoided here; instead simulate that the object was just created, so
        // last_change == created_at == t0 and the first real proposal must wait.
        let outcome = controller
            .evaluate_object("obj-1", &metrics(0.95), t0)
            .await
            .unwrap();
        // confirmation_count == 1, but cooldown (60s) hasn't elapsed since last_change (t0 == now).
        assert_eq!(outcome, ControllerOutcome::Pending { target: Mode::Available, count: 1 });

        let t1 = t0 + chrono::Duration::seconds(61);
        let outcome2 = controller
            .evaluate_object("obj-1", &metrics(0.95), t1)
            .await
            .unwrap();
        assert_eq!(
            outcome2,
            ControllerOutcome::Committed {
                previous: Mode::Strong,
                new: Mode::Available,
                reason: TransitionReason::HighPartitionRisk,
            }
        );
    }

    #[tokio::test]
    async fn emergency_override_bypasses_confirmation_and_cooldown() {
        let mut cfg = EchoConfig::default();
        cfg.confirmation_count = 5;
        cfg.cooldown = std::time::Duration::from_secs(3600);
        cfg.emergency_threshold = 0.8;
        let (_store, controller) = controller_with_object("obj-1", cfg).await;

        let now = Utc::now();
        let outcome = controller.evaluate_object("obj-1", &metrics(0.95), now).await.unwrap();
        assert_eq!(
            outcome,
            ControllerOutcome::Committed {
                previous: Mode::Strong,
                new: Mode::Available,
                reason: TransitionReason::EmergencyOverride,
            }
        );
    }

    #[tokio::test]
    async fn switching_proposed_target_mid_confirmation_resets_count() {
        let mut cfg = EchoConfig::default();
        cfg.confirmation_count = 3;
        cfg.emergency_threshold = 0.99;
        let (_store, controller) = controller_with_object("obj-1", cfg).await;

        let now = Utc::now();
        let first = controller.evaluate_object("obj-1", &metrics(0.95), now).await.unwrap();
        assert_eq!(first, ControllerOutcome::Pending { target: Mode::Available, count: 1 });

        // A tick with near-zero risk proposes Strong again: the pending
        // confirmation toward Available should reset, not accumulate.
        let second = controller.evaluate_object("obj-1", &metrics(0.0), now).await.unwrap();
        assert_eq!(second, ControllerOutcome::Unchanged);

        let state = controller.state_of("obj-1").await.unwrap();
        assert_eq!(state.state, ControllerState::Steady);
    }

    #[tokio::test]
    async fn unknown_object_errors() {
        let store = Arc::new(ObjectStore::new());
        let controller = ModeController::new(store, EchoConfig::default());
        let err = controller
            .evaluate_object("ghost", &metrics(0.0), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EchoError::UnknownObject(_)));
    }
}
