//! Run-outcome classification from solver artifacts.
//!
//! Classification never trusts the solver's exit code. A run counts as
//! finished only when two independent signals agree: the definitive
//! completion marker in the tail of the structured log, and the numeric
//! success token in the captured stdout.

use std::fs;
use std::path::Path;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunOutcome;
use crate::domain::ports::{RunCapture, SolverAdapter};

/// Lines of log tail searched for the completion marker.
const MARKER_TAIL_LINES: usize = 20;
/// Lines of log tail kept in terminal failure reports.
const EXCERPT_LINES: usize = 30;

/// Scalar properties pulled from a finished run's log.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FinalScalars {
    pub enthalpy: Option<f64>,
    pub pressure: Option<f64>,
    pub volume: Option<f64>,
}

/// Classifies one solver invocation and reads iteration bookkeeping out
/// of the cumulative log.
pub struct OutcomeClassifier {
    log_marker: String,
    stdout_token: String,
}

impl OutcomeClassifier {
    pub fn for_adapter(adapter: &dyn SolverAdapter) -> Self {
        Self {
            log_marker: adapter.log_marker().to_string(),
            stdout_token: adapter.stdout_token().to_string(),
        }
    }

    /// Classify a completed (or killed) invocation.
    pub fn classify(&self, capture: &RunCapture, log_path: &Path) -> RunOutcome {
        if capture.was_killed {
            return RunOutcome::TimedOut;
        }
        let Ok(log_content) = fs::read_to_string(log_path) else {
            // No log at all: the solver never got far enough to write one.
            return RunOutcome::Errored;
        };
        let marker_in_tail = tail_lines(&log_content, MARKER_TAIL_LINES)
            .iter()
            .any(|line| line.contains(&self.log_marker));
        if marker_in_tail && capture.stdout.contains(&self.stdout_token) {
            RunOutcome::Finished
        } else {
            RunOutcome::Errored
        }
    }

    /// Optimization iterations the lineage has completed so far, counted
    /// across the whole cumulative log. Used to compute the cycle budget
    /// left after a timeout.
    pub fn completed_iteration_count(log_path: &Path) -> DomainResult<u32> {
        let content = fs::read_to_string(log_path)?;
        Ok(count_matches(&content, "starting iteration"))
    }

    /// Status of the most recent optimization pass: whether it reached
    /// the solver's own completed state, and how many iterations the
    /// solver reports having finished.
    pub fn pass_status(log_path: &Path) -> DomainResult<(bool, u32)> {
        let content = fs::read_to_string(log_path)?;
        let completed = content
            .lines()
            .rev()
            .find_map(|line| {
                let (_, rest) = line.split_once("Geometry optimization")?;
                rest.split_whitespace().next().map(|w| w == "completed")
            })
            .unwrap_or(false);
        let iterations = count_matches(&content, ": finished iteration");
        Ok((completed, iterations))
    }

    /// Tail of the solver log for failure reports, or `None` when no log
    /// was written.
    pub fn last_log_excerpt(log_path: &Path) -> Option<String> {
        let content = fs::read_to_string(log_path).ok()?;
        Some(tail_lines(&content, EXCERPT_LINES).join("\n"))
    }

    /// Best-effort scalar extraction from a finished run's log. A scalar
    /// the log does not report stays `None`; extraction never fails the
    /// run.
    pub fn final_scalars(log_path: &Path) -> FinalScalars {
        let Ok(content) = fs::read_to_string(log_path) else {
            return FinalScalars::default();
        };
        let mut scalars = FinalScalars::default();
        for line in content.lines() {
            if line.contains("Pressure:") {
                scalars.pressure = line
                    .rsplit(':')
                    .next()
                    .and_then(|v| v.trim_matches(['|', '*', ' ']).parse().ok())
                    .or(scalars.pressure);
            } else if line.contains("Final Enthalpy") || line.contains("Final free energy") {
                scalars.enthalpy = value_after_equals(line).or(scalars.enthalpy);
            } else if line.contains("Current cell volume") {
                scalars.volume = value_after_equals(line).or(scalars.volume);
            }
        }
        scalars
    }
}

fn value_after_equals(line: &str) -> Option<f64> {
    line.split('=')
        .nth(1)?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

fn count_matches(content: &str, needle: &str) -> u32 {
    content.lines().filter(|line| line.contains(needle)).count() as u32
}

fn tail_lines(content: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn classifier() -> OutcomeClassifier {
        OutcomeClassifier {
            log_marker: "Total time".to_string(),
            stdout_token: "Pressure".to_string(),
        }
    }

    fn write_log(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("s1.castep");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_marker_and_token_mean_finished() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir, "lots of output\nTotal time = 42 s\n");
        let capture = RunCapture {
            stdout: "Pressure: 0.01\n".to_string(),
            was_killed: false,
        };
        assert_eq!(classifier().classify(&capture, &log), RunOutcome::Finished);
    }

    #[test]
    fn test_marker_outside_tail_is_errored() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("Total time = 42 s\n");
        for i in 0..40 {
            content.push_str(&format!("line {i}\n"));
        }
        let log = write_log(&dir, &content);
        let capture = RunCapture {
            stdout: "Pressure: 0.01\n".to_string(),
            was_killed: false,
        };
        assert_eq!(classifier().classify(&capture, &log), RunOutcome::Errored);
    }

    #[test]
    fn test_missing_stdout_token_is_errored() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir, "Total time = 42 s\n");
        let capture = RunCapture::default();
        assert_eq!(classifier().classify(&capture, &log), RunOutcome::Errored);
    }

    #[test]
    fn test_killed_run_is_timed_out_regardless_of_log() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir, "Total time = 42 s\n");
        let capture = RunCapture {
            stdout: "Pressure: 0.01\n".to_string(),
            was_killed: true,
        };
        assert_eq!(classifier().classify(&capture, &log), RunOutcome::TimedOut);
    }

    #[test]
    fn test_missing_log_is_errored() {
        let dir = TempDir::new().unwrap();
        let capture = RunCapture {
            stdout: "Pressure: 0.01\n".to_string(),
            was_killed: false,
        };
        let missing = dir.path().join("absent.castep");
        assert_eq!(classifier().classify(&capture, &missing), RunOutcome::Errored);
    }

    #[test]
    fn test_iteration_counting_is_cumulative() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            "starting iteration 1\n: finished iteration 1\nstarting iteration 2\n: finished iteration 2\nstarting iteration 3\n",
        );
        assert_eq!(OutcomeClassifier::completed_iteration_count(&log).unwrap(), 3);
        let (_, finished) = OutcomeClassifier::pass_status(&log).unwrap();
        assert_eq!(finished, 2);
    }

    #[test]
    fn test_pass_status_uses_last_optimization_verdict() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            "Geometry optimization failed to converge\nmore output\nGeometry optimization completed successfully\n",
        );
        let (completed, _) = OutcomeClassifier::pass_status(&log).unwrap();
        assert!(completed);

        let log = write_log(
            &dir,
            "Geometry optimization completed successfully\nGeometry optimization failed to converge\n",
        );
        let (completed, _) = OutcomeClassifier::pass_status(&log).unwrap();
        assert!(!completed);
    }

    #[test]
    fn test_final_scalars() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            " *  Pressure:   1.2500  *\nFinal Enthalpy     = -123.456 eV\nCurrent cell volume =  58.2 A**3\n",
        );
        let scalars = OutcomeClassifier::final_scalars(&log);
        assert_eq!(scalars.pressure, Some(1.25));
        assert_eq!(scalars.enthalpy, Some(-123.456));
        assert_eq!(scalars.volume, Some(58.2));
    }

    #[test]
    fn test_final_scalars_tolerate_missing_fields() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir, "no scalars here\n");
        assert_eq!(OutcomeClassifier::final_scalars(&log), FinalScalars::default());
    }
}
