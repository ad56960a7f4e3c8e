//! Plane-wave solver adapter.
//!
//! Runs go through the `castep_relax` wrapper script, which owns the
//! restart-file bookkeeping of the solver itself. Runs are expensive, so
//! the minimum-run-time floor and the kill safety offset are large.

use crate::domain::models::{RelaxationJob, SolverConfig};
use crate::domain::ports::SolverAdapter;

const DEFAULT_MINIMUM_RUN_TIME: u64 = 600;
const DEFAULT_SAFETY_OFFSET: u64 = 60;

pub struct CastepAdapter {
    executable: String,
    prepend_command: Vec<String>,
    append_command: Vec<String>,
    minimum_run_time: u64,
    safety_offset: u64,
}

impl CastepAdapter {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            prepend_command: config.prepend_command.clone(),
            append_command: config.append_command.clone(),
            minimum_run_time: config.minimum_run_time_secs.unwrap_or(DEFAULT_MINIMUM_RUN_TIME),
            safety_offset: config.safety_offset_secs.unwrap_or(DEFAULT_SAFETY_OFFSET),
        }
    }
}

impl SolverAdapter for CastepAdapter {
    fn family(&self) -> &'static str {
        "castep"
    }

    fn build_command(&self, job: &RelaxationJob) -> Vec<String> {
        vec![
            "castep_relax".to_string(),
            job.cycles_remaining.to_string(),
            self.executable.clone(),
            "0".to_string(),
            "0".to_string(),
            job.structure_id.clone(),
        ]
    }

    fn minimum_run_time(&self) -> u64 {
        self.minimum_run_time
    }

    fn safety_offset(&self) -> u64 {
        self.safety_offset
    }

    fn input_files(&self, job: &RelaxationJob) -> Vec<(String, String)> {
        vec![
            (self.cell_file(&job.structure_id), job.input_state.cell.clone()),
            (self.param_file(&job.structure_id), job.input_state.param.clone()),
        ]
    }

    fn param_file(&self, structure_id: &str) -> String {
        format!("{structure_id}.param")
    }

    fn log_file(&self, structure_id: &str) -> String {
        format!("{structure_id}.castep")
    }

    fn log_marker(&self) -> &'static str {
        "Total time"
    }

    fn stdout_token(&self) -> &'static str {
        "Pressure"
    }

    fn prepend_command(&self) -> &[String] {
        &self.prepend_command
    }

    fn append_command(&self) -> &[String] {
        &self.append_command
    }
}
