pub mod engine;

pub use engine::{PolicyDecision, PolicyEngine, TransitionReason};
