//! Domain models: pure data, no infrastructure dependencies.

pub mod config;
pub mod job;
pub mod outcome;

pub use config::{Config, LogConfig, OracleConfig, RelaxPolicy, SolverConfig, SolverFamily};
pub use job::{FailureReason, InputState, RelaxationJob, RelaxedResult, TerminalReport};
pub use outcome::{RelaxationState, RunOutcome};
