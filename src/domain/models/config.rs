//! Worker configuration model.
//!
//! Executable paths and per-solver tunables are resolved once at worker
//! startup into this struct and passed down, never read ad hoc mid-run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for a relaxation worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Solver family selection and executable resolution.
    #[serde(default)]
    pub solver: SolverConfig,

    /// Restart-policy tunables.
    #[serde(default)]
    pub relax: RelaxPolicy,

    /// Wall-clock oracle configuration.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,
}

/// Known solver families. Selection is by configuration, not inheritance:
/// each family has one `SolverAdapter` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverFamily {
    /// Primary plane-wave solver driven through its relaxation wrapper.
    Castep,
    /// Lightweight pair-potential solver; fast runs, small safety margins.
    Pp3,
}

impl Default for SolverFamily {
    fn default() -> Self {
        Self::Castep
    }
}

impl SolverFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Castep => "castep",
            Self::Pp3 => "pp3",
        }
    }
}

/// Per-solver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SolverConfig {
    #[serde(default)]
    pub family: SolverFamily,

    /// Executable string handed to the relaxation wrapper. May include an
    /// MPI launcher prefix; treated as opaque by the controller.
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Shell commands run before the solver (module loads and the like).
    #[serde(default)]
    pub prepend_command: Vec<String>,

    /// Shell commands run after the solver (cleanup).
    #[serde(default)]
    pub append_command: Vec<String>,

    /// Override of the per-family minimum run time floor, in seconds.
    #[serde(default)]
    pub minimum_run_time_secs: Option<u64>,

    /// Override of the per-family kill-and-cleanup safety offset, in seconds.
    #[serde(default)]
    pub safety_offset_secs: Option<u64>,

    /// External pressure passed to solvers that take one.
    #[serde(default)]
    pub pressure: f64,
}

fn default_executable() -> String {
    "castep.mpi".to_string()
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            family: SolverFamily::default(),
            executable: default_executable(),
            prepend_command: vec![],
            append_command: vec![],
            minimum_run_time_secs: None,
            safety_offset_secs: None,
            pressure: 0.0,
        }
    }
}

/// Tunables of the multi-stage restart policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RelaxPolicy {
    /// Exploratory short-cycle passes before production mode.
    #[serde(default = "default_exploratory_cycles")]
    pub exploratory_cycles: u32,

    /// Solver-internal iteration cap used during exploratory passes.
    #[serde(default = "default_exploratory_iter_cap")]
    pub exploratory_iter_cap: u32,

    /// Minimum-usefulness floor: a continuation with fewer cycles left
    /// than this is not worth a new job launch.
    #[serde(default = "default_min_continuation_cycles")]
    pub min_continuation_cycles: u32,

    /// Default launch limit for new jobs.
    #[serde(default = "default_launch_limit")]
    pub launch_limit: u32,

    /// Priority added to ordinary timeout continuations.
    #[serde(default = "default_continuation_priority_offset")]
    pub continuation_priority_offset: i64,

    /// Priority added to insufficient-time continuations; higher than the
    /// ordinary offset to bias the queue away from re-starving the job.
    #[serde(default = "default_insufficient_time_priority_offset")]
    pub insufficient_time_priority_offset: i64,

    /// Bounce limit for the insufficient-time path.
    #[serde(default = "default_max_insufficient_time_launches")]
    pub max_insufficient_time_launches: u32,

    /// Toggle cell constraints on and off every other production pass.
    /// Rarely used; transparent to the success counter.
    #[serde(default)]
    pub alternate_cell_constraints: bool,
}

const fn default_exploratory_cycles() -> u32 {
    4
}

const fn default_exploratory_iter_cap() -> u32 {
    4
}

const fn default_min_continuation_cycles() -> u32 {
    20
}

const fn default_launch_limit() -> u32 {
    5
}

const fn default_continuation_priority_offset() -> i64 {
    10
}

const fn default_insufficient_time_priority_offset() -> i64 {
    15
}

const fn default_max_insufficient_time_launches() -> u32 {
    3
}

impl Default for RelaxPolicy {
    fn default() -> Self {
        Self {
            exploratory_cycles: default_exploratory_cycles(),
            exploratory_iter_cap: default_exploratory_iter_cap(),
            min_continuation_cycles: default_min_continuation_cycles(),
            launch_limit: default_launch_limit(),
            continuation_priority_offset: default_continuation_priority_offset(),
            insufficient_time_priority_offset: default_insufficient_time_priority_offset(),
            max_insufficient_time_launches: default_max_insufficient_time_launches(),
            alternate_cell_constraints: false,
        }
    }
}

/// Wall-clock oracle configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OracleConfig {
    /// Explicit budget override in seconds. When set, a fixed-budget
    /// oracle is used regardless of the surrounding environment.
    #[serde(default)]
    pub budget_override_secs: Option<i64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for rolling file output.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
