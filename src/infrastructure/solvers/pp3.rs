//! Pair-potential solver adapter.
//!
//! Runs go through the `pp3_relax` wrapper. Runs are cheap enough that a
//! pass is assumed to fit almost any window, so both the minimum-run-time
//! floor and the safety offset are small.

use crate::domain::models::{RelaxationJob, SolverConfig};
use crate::domain::ports::SolverAdapter;

const DEFAULT_MINIMUM_RUN_TIME: u64 = 10;
const DEFAULT_SAFETY_OFFSET: u64 = 10;

pub struct Pp3Adapter {
    executable: String,
    pressure: f64,
    prepend_command: Vec<String>,
    append_command: Vec<String>,
    minimum_run_time: u64,
    safety_offset: u64,
}

impl Pp3Adapter {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            pressure: config.pressure,
            prepend_command: config.prepend_command.clone(),
            append_command: config.append_command.clone(),
            minimum_run_time: config.minimum_run_time_secs.unwrap_or(DEFAULT_MINIMUM_RUN_TIME),
            safety_offset: config.safety_offset_secs.unwrap_or(DEFAULT_SAFETY_OFFSET),
        }
    }
}

impl SolverAdapter for Pp3Adapter {
    fn family(&self) -> &'static str {
        "pp3"
    }

    fn build_command(&self, job: &RelaxationJob) -> Vec<String> {
        vec![
            "pp3_relax".to_string(),
            self.executable.clone(),
            "0".to_string(),
            self.pressure.to_string(),
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

    /// The potential definition plays the role of the control file.
    fn param_file(&self, structure_id: &str) -> String {
        format!("{structure_id}.pp")
    }

    /// The wrapper mirrors its log into the same file name the primary
    /// solver uses, so the classifier reads one place regardless of family.
    fn log_file(&self, structure_id: &str) -> String {
        format!("{structure_id}.castep")
    }

    fn log_marker(&self) -> &'static str {
        "Final Enthalpy"
    }

    fn stdout_token(&self) -> &'static str {
        "Volume"
    }

    fn prepend_command(&self) -> &[String] {
        &self.prepend_command
    }

    fn append_command(&self) -> &[String] {
        &self.append_command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::InputState;

    #[test]
    fn test_command_carries_pressure() {
        let adapter = Pp3Adapter::from_config(&SolverConfig {
            executable: "pp3".to_string(),
            pressure: 10.0,
            ..Default::default()
        });
        let job = RelaxationJob::new("al-004", InputState::default(), 0);
        assert_eq!(
            adapter.build_command(&job),
            vec!["pp3_relax", "pp3", "0", "10", "al-004"]
        );
    }

    #[test]
    fn test_small_floors() {
        let adapter = Pp3Adapter::from_config(&SolverConfig::default());
        assert_eq!(adapter.minimum_run_time(), 10);
        assert_eq!(adapter.safety_offset(), 10);
        assert_eq!(adapter.param_file("s1"), "s1.pp");
    }
}
