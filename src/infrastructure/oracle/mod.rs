//! Wall-clock oracles and environment detection.

pub mod fixed;
pub mod sge;
pub mod slurm;

use std::sync::Arc;

use tracing::info;

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::models::OracleConfig;
use crate::domain::ports::WallClockOracle;

pub use fixed::FixedBudgetOracle;
pub use sge::SgeOracle;
pub use slurm::SlurmOracle;

/// Resolve the oracle for the current environment.
///
/// An explicit budget override wins over everything; otherwise the
/// surrounding batch environment is probed. Running with neither is a
/// misconfiguration fatal to the whole worker: a silently guessed
/// budget would defeat every deadline decision downstream.
pub fn detect(config: &OracleConfig) -> DomainResult<Arc<dyn WallClockOracle>> {
    if let Some(secs) = config.budget_override_secs {
        info!(budget_secs = secs, "using fixed wall-clock budget");
        return Ok(Arc::new(FixedBudgetOracle::new(secs)));
    }
    if let Some(oracle) = SlurmOracle::detect() {
        return Ok(Arc::new(oracle));
    }
    if let Some(oracle) = SgeOracle::detect() {
        return Ok(Arc::new(oracle));
    }
    Err(RelaxError::NoScheduleContext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        temp_env::with_var("SLURM_JOB_ID", Some("123"), || {
            let oracle = detect(&OracleConfig {
                budget_override_secs: Some(3600),
            })
            .unwrap();
            assert_eq!(oracle.name(), "fixed");
        });
    }

    #[test]
    fn test_slurm_probed_before_sge() {
        temp_env::with_vars(
            [("SLURM_JOB_ID", Some("123")), ("JOB_ID", Some("456"))],
            || {
                let oracle = detect(&OracleConfig::default()).unwrap();
                assert_eq!(oracle.name(), "slurm");
            },
        );
    }

    #[test]
    fn test_no_context_is_fatal() {
        temp_env::with_vars(
            [("SLURM_JOB_ID", None::<&str>), ("JOB_ID", None)],
            || {
                assert!(matches!(
                    detect(&OracleConfig::default()),
                    Err(RelaxError::NoScheduleContext)
                ));
            },
        );
    }
}
