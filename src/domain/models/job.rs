//! Relaxation job domain model.
//!
//! A `RelaxationJob` is one unit of work submitted to the job queue.
//! Continuation jobs carry forward the checkpointed state of a job that
//! could not finish within one execution window; the sequence of jobs
//! working on the same structure is a lineage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serialized geometry and control-file content needed to resume a run.
///
/// Byte content, not a reference: a continuation may be picked up on a
/// different execution host, so everything the solver needs travels with
/// the job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    /// Structure file content (cell vectors, positions, constraints).
    pub cell: String,
    /// Control file content (solver parameters).
    pub param: String,
}

/// Reason a job ended in a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Solver exited within the deadline but without the success marker.
    Errored,
    /// The configured overall cycle cap was exceeded, or too few cycles
    /// remained for a continuation to be worth launching.
    CycleExceeded,
    /// The lineage hit its launch limit; no further continuations.
    LaunchLimitExceeded,
    /// The insufficient-time path bounced more times than allowed.
    InsufficientTime,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Errored => "errored",
            Self::CycleExceeded => "cycle_exceeded",
            Self::LaunchLimitExceeded => "launch_limit_exceeded",
            Self::InsufficientTime => "insufficient_time",
        }
    }
}

/// Structured failure tuple reported to the job queue on every terminal
/// failure. Nothing is thrown past the controller's top-level call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalReport {
    /// Lineage identifier.
    pub structure_id: String,
    pub reason: FailureReason,
    /// Launches consumed by the lineage, this job included.
    pub launch_count: u32,
    /// Tail of the solver log, when one exists.
    pub log_excerpt: Option<String>,
}

/// Terminal success artifact: the final relaxed geometry, derived scalar
/// properties, and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxedResult {
    pub structure_id: String,
    /// Final relaxed geometry in the solver's own input format.
    pub cell: String,
    pub enthalpy: Option<f64>,
    pub pressure: Option<f64>,
    pub volume: Option<f64>,
    /// Total launches the lineage consumed to converge.
    pub launch_count: u32,
}

/// One unit of relaxation work, consumed exactly once by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxationJob {
    /// Opaque identifier of the geometry being relaxed; shared by every
    /// continuation in the lineage.
    pub structure_id: String,
    /// Geometry and control-file content to resume from.
    pub input_state: InputState,
    /// Optimization iterations left. `0` is a sentinel: run to the
    /// solver's own internal limit, no external cap.
    pub cycles_remaining: u32,
    /// Times this lineage has been launched; monotonically increasing
    /// across continuations.
    pub launch_count: u32,
    /// Maximum allowed `launch_count` before the controller refuses
    /// further continuations.
    pub launch_limit: u32,
    /// Scheduling priority. Continuations inherit the parent's priority
    /// plus a fixed offset so resumed work is preferred over fresh work.
    pub priority: i64,
    /// Times the lineage has bounced through the insufficient-time path.
    pub insufficient_time_launches: u32,
    pub created_at: DateTime<Utc>,
}

impl RelaxationJob {
    pub fn new(structure_id: impl Into<String>, input_state: InputState, cycles: u32) -> Self {
        Self {
            structure_id: structure_id.into(),
            input_state,
            cycles_remaining: cycles,
            launch_count: 0,
            launch_limit: 5,
            priority: 0,
            insufficient_time_launches: 0,
            created_at: Utc::now(),
        }
    }

    /// Set the launch limit.
    pub fn with_launch_limit(mut self, limit: u32) -> Self {
        self.launch_limit = limit;
        self
    }

    /// Set the base scheduling priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// One-pass mode: no external cycle cap, a single successful
    /// production pass is enough and the exploratory phase is skipped.
    pub fn is_single_pass(&self) -> bool {
        self.cycles_remaining == 0
    }

    /// Whether one more launch would stay within the launch limit.
    pub fn can_launch_successor(&self) -> bool {
        self.launch_count + 1 < self.launch_limit
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.structure_id.trim().is_empty() {
            return Err("structure_id cannot be empty".to_string());
        }
        if self.input_state.cell.trim().is_empty() {
            return Err("input cell content cannot be empty".to_string());
        }
        if self.launch_limit == 0 {
            return Err("launch_limit cannot be 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> InputState {
        InputState {
            cell: "%BLOCK LATTICE_CART\n1 0 0\n%ENDBLOCK LATTICE_CART\n".to_string(),
            param: "task: geometryoptimization\n".to_string(),
        }
    }

    #[test]
    fn test_new_job_defaults() {
        let job = RelaxationJob::new("seed-001", input(), 200);
        assert_eq!(job.launch_count, 0);
        assert_eq!(job.launch_limit, 5);
        assert_eq!(job.priority, 0);
        assert!(!job.is_single_pass());
        assert!(job.can_launch_successor());
    }

    #[test]
    fn test_single_pass_sentinel() {
        let job = RelaxationJob::new("seed-001", input(), 0);
        assert!(job.is_single_pass());
    }

    #[test]
    fn test_successor_budget() {
        let mut job = RelaxationJob::new("seed-001", input(), 100).with_launch_limit(3);
        job.launch_count = 1;
        assert!(job.can_launch_successor());
        job.launch_count = 2;
        assert!(!job.can_launch_successor());
    }

    #[test]
    fn test_validation() {
        let job = RelaxationJob::new("", input(), 100);
        assert!(job.validate().is_err());

        let job = RelaxationJob::new("seed-001", InputState::default(), 100);
        assert!(job.validate().is_err());

        let job = RelaxationJob::new("seed-001", input(), 100).with_launch_limit(0);
        assert!(job.validate().is_err());

        let job = RelaxationJob::new("seed-001", input(), 100);
        assert!(job.validate().is_ok());
    }
}
