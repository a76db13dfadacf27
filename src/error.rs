use thiserror::Error;

/// Error taxonomy for the adaptive consistency core (spec §7).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EchoError {
    #[error("object '{0}' not found")]
    UnknownObject(String),

    #[error("invalid mode hint: {0}")]
    InvalidHint(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("insufficient healthy replicas: required {required}, available {available}")]
    InsufficientReplicas { required: usize, available: usize },

    #[error("transient remote failure: {0}")]
    TransientRemote(String),

    #[error("controller degraded: {0}")]
    ControllerDegraded(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("object '{0}' already registered")]
    ObjectExists(String),
}

pub type Result<T> = std::result::Result<T, EchoError>;
