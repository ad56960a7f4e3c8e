//! Relaxq - Resumable Relaxation Controller
//!
//! Relaxq drives external geometry-optimization solvers under hard
//! wall-clock budgets: each job runs inside a scheduler-imposed window,
//! checkpoints its trajectory when the window closes, and re-queues a
//! continuation job that resumes from the last snapshot on whatever host
//! picks it up next.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Jobs, run outcomes, restart-policy state,
//!   and the port contracts (queue, store, oracle, solver, runner)
//! - **Service Layer** (`services`): The relaxation controller state machine,
//!   outcome classification, checkpoint extraction, and the worker loop
//! - **Infrastructure Layer** (`infrastructure`): Solver adapters, scheduler
//!   oracles, the subprocess runner, queue and store implementations
//!
//! # Example
//!
//! ```ignore
//! use relaxq::infrastructure::{ConfigLoader, SubprocessRunner};
//! use relaxq::services::Worker;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     // Wire a Worker from the config and drain the queue
//!     Ok(())
//! }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainResult, RelaxError};
pub use domain::models::{
    Config, FailureReason, InputState, LogConfig, OracleConfig, RelaxPolicy, RelaxationJob,
    RelaxationState, RelaxedResult, RunOutcome, SolverConfig, SolverFamily, TerminalReport,
};
pub use domain::ports::{
    ArtifactKind, JobDisposition, JobHandle, JobQueue, ResultStore, RunCapture, SolverAdapter,
    SolverRunner, StoreKey, WallClockOracle,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ContinuationBuilder, ContinuationReason, ControllerOutcome, RelaxationController, Worker,
    WorkerTick,
};
