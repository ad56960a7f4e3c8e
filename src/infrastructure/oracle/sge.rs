//! SGE wall-clock oracle.
//!
//! SGE reports no end time directly; it is reconstructed as
//! `start_time + h_rt`. The start time comes from the XML form of
//! `qstat -j` as a Unix epoch (always UTC on the scheduler side), the
//! `h_rt` hard limit from the plain-text form.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::ports::WallClockOracle;

pub struct SgeOracle {
    job_id: String,
}

impl SgeOracle {
    /// Present only when running inside an SGE job.
    pub fn detect() -> Option<Self> {
        let mut job_id = std::env::var("JOB_ID").ok()?;
        if let Ok(task_id) = std::env::var("SGE_TASK_ID") {
            if task_id != "undefined" {
                // Task arrays share a JOB_ID; qstat needs the suffix,
                // though the per-task start time is approximate.
                warn!(task_id = %task_id, "task array detected; remaining time is approximate");
                job_id = format!("{job_id}.{task_id}");
            }
        }
        debug!(job_id = %job_id, "sge job detected");
        Some(Self { job_id })
    }

    async fn qstat_output(&self, xml: bool) -> DomainResult<String> {
        let mut cmd = Command::new("qstat");
        cmd.arg("-j").arg(&self.job_id);
        if xml {
            cmd.arg("-xml");
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| RelaxError::Spawn(format!("qstat: {e}")))?;
        if !output.status.success() {
            return Err(RelaxError::Parse(format!(
                "qstat exited with {:?} for job {}",
                output.status.code(),
                self.job_id
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Pull the `h_rt` hard limit (seconds) out of plain `qstat -j` output.
fn parse_max_run_seconds(output: &str) -> DomainResult<i64> {
    let rlist = output
        .lines()
        .find(|line| line.contains("hard resource_list"))
        .ok_or_else(|| RelaxError::Parse("no hard resource_list in qstat output".to_string()))?;
    let after = rlist
        .split("h_rt=")
        .nth(1)
        .ok_or_else(|| RelaxError::Parse("no h_rt in hard resource_list".to_string()))?;
    let digits: String = after.chars().take_while(char::is_ascii_digit).collect();
    digits
        .parse()
        .map_err(|_| RelaxError::Parse(format!("bad h_rt value in {rlist:?}")))
}

/// Pull the job start time out of `qstat -j -xml` output.
fn parse_start_time(xml: &str) -> DomainResult<DateTime<Utc>> {
    let raw = xml
        .split("<JAT_start_time>")
        .nth(1)
        .and_then(|rest| rest.split("</JAT_start_time>").next())
        .ok_or_else(|| RelaxError::Parse("no JAT_start_time in qstat xml".to_string()))?;
    let epoch: i64 = raw
        .trim()
        .parse()
        .map_err(|_| RelaxError::Parse(format!("bad JAT_start_time value {raw:?}")))?;
    DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| RelaxError::Parse(format!("JAT_start_time {epoch} out of range")))
}

#[async_trait]
impl WallClockOracle for SgeOracle {
    fn name(&self) -> &'static str {
        "sge"
    }

    async fn remaining_seconds(&self) -> DomainResult<i64> {
        let max_run = parse_max_run_seconds(&self.qstat_output(false).await?)?;
        let start = parse_start_time(&self.qstat_output(true).await?)?;
        let end = start + Duration::seconds(max_run);
        Ok((end - Utc::now()).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_run_seconds() {
        let output = "\
==============================================================
job_number:                 4242
hard resource_list:         h_rt=43200,mem=4G
env_list:                   TERM=NONE
";
        assert_eq!(parse_max_run_seconds(output).unwrap(), 43200);
    }

    #[test]
    fn test_parse_start_time() {
        let xml = "<detailed_job_info><JAT_start_time>1709280000</JAT_start_time></detailed_job_info>";
        let start = parse_start_time(xml).unwrap();
        assert_eq!(start.timestamp(), 1_709_280_000);
    }

    #[test]
    fn test_parse_errors_are_reported() {
        assert!(parse_max_run_seconds("no limits here").is_err());
        assert!(parse_start_time("<nothing/>").is_err());
    }

    #[test]
    fn test_detect_appends_task_array_suffix() {
        temp_env::with_vars(
            [("JOB_ID", Some("777")), ("SGE_TASK_ID", Some("3"))],
            || {
                let oracle = SgeOracle::detect().expect("in job");
                assert_eq!(oracle.job_id, "777.3");
            },
        );
        temp_env::with_vars(
            [("JOB_ID", Some("777")), ("SGE_TASK_ID", Some("undefined"))],
            || {
                let oracle = SgeOracle::detect().expect("in job");
                assert_eq!(oracle.job_id, "777");
            },
        );
    }
}
