//! Slurm wall-clock oracle.
//!
//! `scontrol show jobid=<id>` reports `EndTime=` as a naive local
//! timestamp; the subtraction against now must stay in local time or the
//! figure is off by the UTC offset, which is more than most windows'
//! safety margin.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone};
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::ports::WallClockOracle;

const END_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct SlurmOracle {
    job_id: String,
}

impl SlurmOracle {
    /// Present only when running inside a Slurm allocation.
    pub fn detect() -> Option<Self> {
        let job_id = std::env::var("SLURM_JOB_ID").ok()?;
        debug!(job_id = %job_id, "slurm allocation detected");
        Some(Self { job_id })
    }

    async fn scontrol_output(&self) -> DomainResult<String> {
        let output = Command::new("scontrol")
            .arg("show")
            .arg(format!("jobid={}", self.job_id))
            .output()
            .await
            .map_err(|e| RelaxError::Spawn(format!("scontrol: {e}")))?;
        if !output.status.success() {
            return Err(RelaxError::Parse(format!(
                "scontrol exited with {:?} for job {}",
                output.status.code(),
                self.job_id
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Pull the `EndTime=` field out of `scontrol show jobid` output.
fn parse_end_time(output: &str) -> DomainResult<NaiveDateTime> {
    let value = output
        .split_whitespace()
        .find_map(|pair| pair.strip_prefix("EndTime="))
        .ok_or_else(|| RelaxError::Parse("no EndTime field in scontrol output".to_string()))?;
    NaiveDateTime::parse_from_str(value, END_TIME_FORMAT)
        .map_err(|e| RelaxError::Parse(format!("bad EndTime value {value:?}: {e}")))
}

#[async_trait]
impl WallClockOracle for SlurmOracle {
    fn name(&self) -> &'static str {
        "slurm"
    }

    async fn remaining_seconds(&self) -> DomainResult<i64> {
        let output = self.scontrol_output().await?;
        let naive = parse_end_time(&output)?;
        let end = Local
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| RelaxError::Parse(format!("ambiguous local EndTime {naive}")))?;
        Ok((end - Local::now()).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const SCONTROL_OUTPUT: &str = "\
JobId=123456 JobName=relax-batch
   UserId=abc123(1000) GroupId=users(100) MCS_label=N/A
   RunTime=01:10:00 TimeLimit=12:00:00 TimeMin=N/A
   SubmitTime=2024-03-01T08:00:00 EligibleTime=2024-03-01T08:00:00
   StartTime=2024-03-01T09:00:00 EndTime=2024-03-01T21:00:00 Deadline=N/A
   Partition=compute AllocNode:Sid=login01:4321
";

    #[test]
    fn test_parse_end_time() {
        let end = parse_end_time(SCONTROL_OUTPUT).unwrap();
        assert_eq!((end.year(), end.month(), end.day()), (2024, 3, 1));
        assert_eq!(end.hour(), 21);
    }

    #[test]
    fn test_missing_end_time_is_an_error() {
        assert!(matches!(
            parse_end_time("JobId=1 Partition=compute"),
            Err(RelaxError::Parse(_))
        ));
    }

    #[test]
    fn test_detect_requires_env() {
        temp_env::with_var("SLURM_JOB_ID", None::<&str>, || {
            assert!(SlurmOracle::detect().is_none());
        });
        temp_env::with_var("SLURM_JOB_ID", Some("9876"), || {
            let oracle = SlurmOracle::detect().expect("in job");
            assert_eq!(oracle.job_id, "9876");
        });
    }
}
