use super::metadata::Mode;
use chrono::{DateTime, Utc};

/// Per-object controller state machine (spec §4.4, §9).
///
/// Modeled as a tagged variant rather than boolean flags, per the design
/// note: emergency override is a distinct commit path, not a flag on
/// `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No proposal in flight; `committed_mode` (see `ObjectModeState`) is
    /// authoritative and stable.
    Steady,
    /// Accumulating confirmations toward a transition to `target`.
    Pending { target: Mode, count: u32 },
}

/// Full per-object state held inside the Mode Controller (spec §3).
///
/// `committed_mode` always mirrors the mode last written to the Object
/// Store; `state` tracks whether a transition is currently being confirmed.
#[derive(Debug, Clone)]
pub struct ObjectModeState {
    pub committed_mode: Mode,
    pub state: ControllerState,
    pub last_change: DateTime<Utc>,
}

impl ObjectModeState {
    pub fn new(initial_mode: Mode, now: DateTime<Utc>) -> Self {
        Self {
            committed_mode: initial_mode,
            state: ControllerState::Steady,
            last_change: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ControllerState::Pending { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_steady_at_initial_mode() {
        let now = Utc::now();
        let state = ObjectModeState::new(Mode::Strong, now);
        assert_eq!(state.committed_mode, Mode::Strong);
        assert_eq!(state.state, ControllerState::Steady);
        assert!(!state.is_pending());
    }
}
