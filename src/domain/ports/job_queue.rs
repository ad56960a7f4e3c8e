//! Job queue port.
//!
//! The controller never deletes or mutates a queued job in place:
//! continuations are always new submissions, and terminal outcomes are
//! reported through `mark_terminal` as a separate, retriable step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RelaxationJob, RelaxedResult, TerminalReport};

/// Opaque handle to a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub Uuid);

impl JobHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How a consumed job ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobDisposition {
    /// Converged; the result artifact has been stored.
    Completed { result: RelaxedResult },
    /// Terminal failure with a structured report.
    Failed { report: TerminalReport },
    /// Superseded by a continuation job carrying the lineage forward.
    Continued { successor: JobHandle },
}

/// External job queue consumed by the worker loop.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit(&self, job: RelaxationJob) -> DomainResult<JobHandle>;

    /// Fetch the highest-priority pending job, if any.
    async fn fetch_next(&self) -> DomainResult<Option<(JobHandle, RelaxationJob)>>;

    async fn mark_terminal(&self, handle: JobHandle, disposition: JobDisposition)
        -> DomainResult<()>;
}
