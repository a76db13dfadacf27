//! EchoFS adaptive consistency core: a control-plane policy engine that
//! classifies every object into a consistency mode (Strong, Available,
//! Hybrid) and drives mode-specific replication on the write path.
//!
//! This crate is the decision/dispatch engine only. It owns the Object
//! Store's metadata, the Policy Engine, the Mode Controller's hysteresis
//! state machine, and the Replication Dispatcher's mode-routed write path.
//! Chunk transport, metrics collection, and the network surface are
//! supplied by callers through the `MetricsSource` and `WorkerTransport`
//! collaborator traits.

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod hash;
pub mod interface;
pub mod model;
pub mod policy;
pub mod store;
pub mod telemetry;

pub use config::EchoConfig;
pub use controller::{ControllerOutcome, ModeController};
pub use dispatch::{
    AvailableReplicator, HashRing, HybridReplicator, ReplicationDispatcher, ReplicationRequest,
    Replicator, StrongReplicator, WorkerHealth, WorkerPool, WorkerPoolStats, WorkerTransport,
    WriteOutcome,
};
pub use error::{EchoError, Result};
pub use interface::{
    handle_get_mode, handle_set_hint, GetModeRequest, GetModeResponse, InterfaceError,
    SetHintAck, SetHintRequest,
};
pub use model::{
    ChunkRef, ClockOrdering, ControllerState, Mode, ModeHint, ObjectMetadata, ObjectModeState,
    VectorClock,
};
pub use policy::{PolicyDecision, PolicyEngine, TransitionReason};
pub use store::ObjectStore;
pub use telemetry::{
    spawn_sampler_loop, ClusterMetrics, MetricsBundle, MetricsSource, NormalizedMetrics,
    SamplerLoop, TelemetrySampler, TickMetrics,
};
