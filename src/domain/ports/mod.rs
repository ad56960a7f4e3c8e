//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - `JobQueue`: submission, fetch, and terminal bookkeeping of jobs
//! - `ResultStore`: durable key-addressed blob storage
//! - `WallClockOracle`: remaining time before forced termination
//! - `SolverAdapter`: per-family command and file-name assembly
//! - `SolverRunner`: deadline-enforced subprocess execution
//!
//! These contracts keep the controller independent of any specific queue,
//! store, scheduler, or solver.

pub mod job_queue;
pub mod result_store;
pub mod runner;
pub mod solver;
pub mod wall_clock;

pub use job_queue::{JobDisposition, JobHandle, JobQueue};
pub use result_store::{ArtifactKind, ResultStore, StoreKey};
pub use runner::{RunCapture, SolverRunner};
pub use solver::SolverAdapter;
pub use wall_clock::WallClockOracle;
