//! Solver adapter port.
//!
//! One implementation per solver family, selected by configuration, not
//! inheritance. The adapter assembles command lines and names input and
//! log files; the controller treats all of it as opaque.

use crate::domain::models::RelaxationJob;

/// Capability interface for a solver family.
pub trait SolverAdapter: Send + Sync {
    /// Family identifier (matches `SolverFamily::as_str`).
    fn family(&self) -> &'static str;

    /// Command line to launch one relaxation run, argv style. Opaque to
    /// the controller; never parsed or validated downstream.
    fn build_command(&self, job: &RelaxationJob) -> Vec<String>;

    /// Floor below which a run is not worth starting, in seconds.
    fn minimum_run_time(&self) -> u64;

    /// Seconds subtracted from the oracle's figure so the kill-and-cleanup
    /// sequence has room before the enclosing scheduler fires.
    fn safety_offset(&self) -> u64;

    /// Input files to materialize in the working directory before a run:
    /// `(file name, content)` pairs. Existing files are left untouched.
    fn input_files(&self, job: &RelaxationJob) -> Vec<(String, String)>;

    /// Name of the structure input file.
    fn cell_file(&self, structure_id: &str) -> String {
        format!("{structure_id}.cell")
    }

    /// Name of the control-parameter input file.
    fn param_file(&self, structure_id: &str) -> String;

    /// Name of the structured log file the solver writes.
    fn log_file(&self, structure_id: &str) -> String;

    /// Definitive completion marker looked for in the log tail.
    fn log_marker(&self) -> &'static str;

    /// Numeric success token expected in the captured stdout.
    fn stdout_token(&self) -> &'static str;

    /// Shell commands to run before the solver, if any.
    fn prepend_command(&self) -> &[String];

    /// Shell commands to run after the solver, if any.
    fn append_command(&self) -> &[String];
}
