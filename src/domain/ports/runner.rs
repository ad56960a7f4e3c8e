//! Process runner port.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::errors::DomainResult;
use crate::domain::models::RelaxationJob;
use crate::domain::ports::SolverAdapter;

/// Raw capture of one solver invocation.
#[derive(Debug, Clone, Default)]
pub struct RunCapture {
    pub stdout: String,
    /// The deadline was hit and the process had to be killed.
    pub was_killed: bool,
}

/// Launches the external solver with a hard deadline.
///
/// The deadline is enforced externally (kill on expiry), not
/// cooperatively: the child is untrusted code. Callers must never invoke
/// `run` with a deadline below the adapter's minimum run time; that
/// condition is handled one level up by the controller.
#[async_trait]
pub trait SolverRunner: Send + Sync {
    /// Write the job's input files into the working directory if not
    /// already present. Never deletes existing files.
    async fn prepare_inputs(
        &self,
        adapter: &dyn SolverAdapter,
        job: &RelaxationJob,
        workdir: &Path,
    ) -> DomainResult<()>;

    /// Run one solver invocation with a hard deadline in seconds.
    async fn run(
        &self,
        adapter: &dyn SolverAdapter,
        job: &RelaxationJob,
        workdir: &Path,
        deadline_secs: u64,
    ) -> DomainResult<RunCapture>;
}
