pub mod dispatcher;
pub mod replicators;
pub mod ring;
pub mod worker;

pub use dispatcher::ReplicationDispatcher;
pub use replicators::{
    AvailableReplicator, HybridReplicator, ReplicationRequest, Replicator, StrongReplicator,
    WriteOutcome,
};
pub use ring::HashRing;
pub use worker::{WorkerHealth, WorkerPool, WorkerPoolStats, WorkerTransport};
