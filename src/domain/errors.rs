//! Domain errors for the relaxation controller.

use thiserror::Error;

/// Domain-level errors shared by the controller and its collaborators.
#[derive(Debug, Error)]
pub enum RelaxError {
    /// Invoked outside a recognized batch environment with no budget override.
    /// Fatal to the whole worker process, not just one job.
    #[error("no schedule context: not inside a recognized batch job and no budget override configured")]
    NoScheduleContext,

    #[error("insufficient run time: {remaining}s remaining, floor is {floor}s")]
    InsufficientRunTime { remaining: i64, floor: u64 },

    #[error("launch limit exceeded: lineage already launched {count} of {limit} times")]
    LaunchLimitExceeded { count: u32, limit: u32 },

    #[error("artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("malformed solver output: {0}")]
    Parse(String),

    #[error("failed to launch solver process: {0}")]
    Spawn(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type DomainResult<T> = Result<T, RelaxError>;

impl From<serde_json::Error> for RelaxError {
    fn from(err: serde_json::Error) -> Self {
        RelaxError::Serialization(err.to_string())
    }
}
