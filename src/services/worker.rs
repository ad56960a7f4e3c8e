//! Worker loop: fetch, run, report, repeat.
//!
//! The worker is the composition root for one execution window. It owns
//! the queue-facing half of the continuation protocol: the controller
//! only builds successor jobs, the worker submits them and marks the
//! parent as superseded. Keeping submission here makes the controller
//! deterministic and trivially testable.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::domain::errors::DomainResult;
use crate::domain::models::RelaxPolicy;
use crate::domain::ports::{
    ArtifactKind, JobDisposition, JobHandle, JobQueue, ResultStore, SolverAdapter, SolverRunner,
    StoreKey, WallClockOracle,
};
use crate::services::controller::{ControllerOutcome, RelaxationController};

/// Result of one `run_once` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerTick {
    /// The queue had nothing pending.
    Idle,
    /// One job was consumed and driven to an outcome.
    Processed(JobHandle),
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ResultStore>,
    oracle: Arc<dyn WallClockOracle>,
    adapter: Arc<dyn SolverAdapter>,
    runner: Arc<dyn SolverRunner>,
    policy: RelaxPolicy,
    workdir_root: PathBuf,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ResultStore>,
        oracle: Arc<dyn WallClockOracle>,
        adapter: Arc<dyn SolverAdapter>,
        runner: Arc<dyn SolverRunner>,
        policy: RelaxPolicy,
        workdir_root: PathBuf,
    ) -> Self {
        Self {
            queue,
            store,
            oracle,
            adapter,
            runner,
            policy,
            workdir_root,
        }
    }

    /// Consume at most one job from the queue.
    ///
    /// Errors returned here are worker-fatal (queue unreachable, no
    /// schedule context); per-job failures have already been reported
    /// through `mark_terminal` and do not surface as `Err`.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> DomainResult<WorkerTick> {
        let Some((handle, job)) = self.queue.fetch_next().await? else {
            return Ok(WorkerTick::Idle);
        };
        info!(
            handle = %handle,
            structure_id = %job.structure_id,
            launch = job.launch_count,
            "job fetched"
        );

        let workdir = self.workdir_root.join(&job.structure_id);
        let controller = RelaxationController::new(
            &*self.adapter,
            &*self.runner,
            &*self.oracle,
            &*self.store,
            &self.policy,
            workdir,
        );

        match controller.run(&job).await? {
            ControllerOutcome::Done(result) => {
                let key = StoreKey::new(&result.structure_id, ArtifactKind::Result);
                self.store
                    .put(&key, serde_json::to_vec(&result)?, true)
                    .await?;
                self.queue
                    .mark_terminal(handle, JobDisposition::Completed { result })
                    .await?;
            }
            ControllerOutcome::Failed(report) => {
                error!(
                    structure_id = %report.structure_id,
                    reason = report.reason.as_str(),
                    "job failed terminally"
                );
                self.queue
                    .mark_terminal(handle, JobDisposition::Failed { report })
                    .await?;
            }
            ControllerOutcome::AwaitingContinuation { job: successor, reason } => {
                info!(
                    structure_id = %successor.structure_id,
                    reason = reason.as_str(),
                    launch = successor.launch_count,
                    "submitting continuation"
                );
                let successor_handle = self.queue.submit(successor).await?;
                self.queue
                    .mark_terminal(
                        handle,
                        JobDisposition::Continued {
                            successor: successor_handle,
                        },
                    )
                    .await?;
            }
        }
        Ok(WorkerTick::Processed(handle))
    }

    /// Drain the queue until it reports empty; returns the number of
    /// jobs processed. Continuations submitted along the way are picked
    /// up in the same drain.
    pub async fn run_until_idle(&self) -> DomainResult<u32> {
        let mut processed = 0;
        while let WorkerTick::Processed(_) = self.run_once().await? {
            processed += 1;
        }
        Ok(processed)
    }
}
