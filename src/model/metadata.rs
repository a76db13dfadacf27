use super::clock::VectorClock;
use crate::error::{EchoError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The per-object consistency regime (spec §3, §4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Strong — synchronous quorum writes.
    Strong,
    /// Available — eager primary, asynchronous fan-out.
    Available,
    /// Blended synchronous-minority / asynchronous-majority policy.
    Hybrid,
}

impl Mode {
    /// Stable single-letter label used in write results and logs (C/A/Hybrid).
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Strong => "C",
            Mode::Available => "A",
            Mode::Hybrid => "Hybrid",
        }
    }
}

/// Operator/user-declared intent (spec §3). Does not itself change `current_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModeHint {
    #[default]
    Auto,
    Strong,
    Available,
}

impl std::str::FromStr for ModeHint {
    type Err = EchoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Auto" | "auto" => Ok(ModeHint::Auto),
            "Strong" | "strong" => Ok(ModeHint::Strong),
            "Available" | "available" => Ok(ModeHint::Available),
            other => Err(EchoError::InvalidHint(other.to_string())),
        }
    }
}

/// An opaque reference to a chunk; chunk storage is delegated to workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub chunk_id: String,
    pub index: u32,
}

/// The record stored per object id (spec §3).
///
/// Only the Mode Controller may mutate `current_mode`/`last_mode_change`;
/// only the Replication Dispatcher may mutate `last_version`, `vector_clock`,
/// `last_sync_timestamp`, and `chunks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub object_id: String,
    pub size: u64,
    pub mode_hint: ModeHint,
    pub current_mode: Mode,
    pub last_version: u64,
    pub vector_clock: VectorClock,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_mode_change: DateTime<Utc>,
    /// Deterministic tag explaining the most recent committed mode change
    /// (spec §6, "Get Mode" response's reason tag).
    pub last_mode_change_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunks: Vec<ChunkRef>,
    /// Set when a write detects a vector-clock conflict (spec §4.5, §7).
    pub conflict: bool,
    /// The competing version observed at the time a conflict was detected.
    pub conflicting_version: Option<u64>,
}

impl ObjectMetadata {
    /// Creates a freshly registered object: current_mode defaults to Strong
    /// (spec §3, "Defaults to C on creation").
    pub fn new(object_id: impl Into<String>, size: u64, now: DateTime<Utc>) -> Self {
        let object_id = object_id.into();
        Self {
            object_id,
            size,
            mode_hint: ModeHint::Auto,
            current_mode: Mode::Strong,
            last_version: 0,
            vector_clock: VectorClock::new(),
            last_sync_timestamp: None,
            last_mode_change: now,
            last_mode_change_reason: "initial".to_string(),
            created_at: now,
            updated_at: now,
            chunks: Vec::new(),
            conflict: false,
            conflicting_version: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.object_id.trim().is_empty() {
            return Err(EchoError::InvalidConfig("object_id must not be empty".into()));
        }
        if self.last_mode_change > self.updated_at.max(Utc::now()) {
            return Err(EchoError::InvalidConfig(
                "last_mode_change must not be in the future".into(),
            ));
        }
        Ok(())
    }
}
