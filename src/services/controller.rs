//! Relaxation controller: drives one job from fetch to terminal outcome.
//!
//! The controller owns the full lifecycle of a consumed job: window
//! checks against the wall-clock oracle, exploratory and production
//! passes, checkpointing on timeout, and continuation construction. No
//! error escapes `run` except the one fatal misconfiguration that must
//! stop the whole worker (no schedule context); everything else is
//! converted into a terminal failure report so a job can never wedge the
//! loop.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::models::{
    FailureReason, InputState, RelaxPolicy, RelaxationJob, RelaxationState, RelaxedResult,
    RunOutcome, TerminalReport,
};
use crate::domain::ports::{ArtifactKind, ResultStore, SolverAdapter, SolverRunner, StoreKey, WallClockOracle};
use crate::services::checkpoint;
use crate::services::classifier::OutcomeClassifier;
use crate::services::continuation::{ContinuationBuilder, ContinuationReason};

/// How one controller invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerOutcome {
    /// Converged; artifacts are stored.
    Done(RelaxedResult),
    /// Terminal failure; nothing more will be launched for the lineage.
    Failed(TerminalReport),
    /// The built successor must be submitted by the caller.
    AwaitingContinuation {
        job: RelaxationJob,
        reason: ContinuationReason,
    },
}

pub struct RelaxationController<'a> {
    adapter: &'a dyn SolverAdapter,
    runner: &'a dyn SolverRunner,
    oracle: &'a dyn WallClockOracle,
    store: &'a dyn ResultStore,
    policy: &'a RelaxPolicy,
    workdir: PathBuf,
}

impl<'a> RelaxationController<'a> {
    pub fn new(
        adapter: &'a dyn SolverAdapter,
        runner: &'a dyn SolverRunner,
        oracle: &'a dyn WallClockOracle,
        store: &'a dyn ResultStore,
        policy: &'a RelaxPolicy,
        workdir: PathBuf,
    ) -> Self {
        Self {
            adapter,
            runner,
            oracle,
            store,
            policy,
            workdir,
        }
    }

    /// Drive `job` to an outcome.
    ///
    /// Only `RelaxError::NoScheduleContext` propagates (fatal to the
    /// worker process); any other internal error becomes a terminal
    /// failure report for this job alone.
    #[instrument(skip(self, job), fields(structure_id = %job.structure_id, launch = job.launch_count))]
    pub async fn run(&self, job: &RelaxationJob) -> DomainResult<ControllerOutcome> {
        match self.run_inner(job).await {
            Ok(outcome) => {
                if matches!(outcome, ControllerOutcome::Failed(_)) {
                    self.discard_artifacts(job).await;
                }
                Ok(outcome)
            }
            Err(RelaxError::NoScheduleContext) => Err(RelaxError::NoScheduleContext),
            Err(err) => {
                error!(error = %err, "internal error; reporting job as errored");
                self.discard_artifacts(job).await;
                Ok(ControllerOutcome::Failed(
                    self.report(job, FailureReason::Errored),
                ))
            }
        }
    }

    async fn run_inner(&self, job: &RelaxationJob) -> DomainResult<ControllerOutcome> {
        job.validate().map_err(RelaxError::Parse)?;
        fs::create_dir_all(&self.workdir)?;
        self.runner
            .prepare_inputs(self.adapter, job, &self.workdir)
            .await?;
        if job.launch_count > 0 {
            self.restore_partial_log(job).await?;
        }
        self.normalize_control_file(job)?;

        // A leftover trajectory means a previous invocation of this
        // lineage died or timed out in this same directory; resume from
        // its last snapshot rather than the job's serialized input.
        if let Some(content) = checkpoint::extract_latest_geometry(&self.workdir, &job.structure_id)?
        {
            checkpoint::write_cell_atomic(&self.workdir, &job.structure_id, &content)?;
        }

        let mut state = self.load_state(job).await?;
        // A crash between persisting the limit-exceeded sentinel and
        // reporting it to the queue redelivers the job; the recorded
        // verdict stands, and no run is launched for it.
        if state.is_limit_exceeded() {
            warn!("persisted state carries the limit-exceeded sentinel");
            return Ok(ControllerOutcome::Failed(
                self.report(job, FailureReason::CycleExceeded),
            ));
        }
        let classifier = OutcomeClassifier::for_adapter(self.adapter);
        let log_path = self.log_path(job);
        let floor = self.adapter.minimum_run_time() as i64;

        let deadline = self.deadline().await?;
        if deadline < floor {
            warn!(
                remaining = deadline,
                floor, "window too short to start; requeueing untouched"
            );
            return self.insufficient_time(job, job.cycles_remaining).await;
        }

        // Exploratory phase: short capped passes to shake the structure
        // out of a pathological starting point cheaply.
        while state.short_cycles_remaining > 0 {
            let deadline = self.deadline().await?;
            if deadline < floor {
                return self.insufficient_time(job, job.cycles_remaining).await;
            }

            let capture = self.run_exploratory_pass(job, deadline as u64).await?;
            match classifier.classify(&capture, &log_path) {
                RunOutcome::Finished => {
                    checkpoint::push_cell(&self.workdir, &job.structure_id)?;
                    state.short_cycles_remaining -= 1;
                    self.persist_state(job, &state).await?;
                    debug!(
                        left = state.short_cycles_remaining,
                        "exploratory pass finished"
                    );
                }
                // Exploratory passes are deliberately short relative to
                // the deadline; any non-finish here signals a deeper
                // problem and is surfaced instead of retried.
                RunOutcome::TimedOut | RunOutcome::Errored | RunOutcome::Undetermined => {
                    return Ok(ControllerOutcome::Failed(
                        self.report(job, FailureReason::Errored),
                    ));
                }
            }
        }

        // Production phase: full passes until the success counter says
        // the optimization is reproducibly converged.
        let mut pass: u32 = 0;
        while state.needs_more_passes() {
            let deadline = self.deadline().await?;
            if deadline < floor {
                let cycles = self.remaining_cycles(job, &log_path);
                return self.insufficient_time(job, cycles).await;
            }

            if self.policy.alternate_cell_constraints {
                self.toggle_constraints(job, pass)?;
            }

            let capture = self
                .runner
                .run(self.adapter, job, &self.workdir, deadline as u64)
                .await?;
            pass += 1;

            match classifier.classify(&capture, &log_path) {
                RunOutcome::TimedOut => return self.handle_timeout(job, &state).await,
                RunOutcome::Errored | RunOutcome::Undetermined => {
                    return Ok(ControllerOutcome::Failed(
                        self.report(job, FailureReason::Errored),
                    ));
                }
                RunOutcome::Finished => {
                    checkpoint::push_cell(&self.workdir, &job.structure_id)?;
                    let (pass_completed, iterations) = OutcomeClassifier::pass_status(&log_path)?;
                    if pass_completed {
                        state.record_success();
                        debug!(counter = state.success_counter, "production pass completed");
                    } else if !job.is_single_pass() && iterations > job.cycles_remaining {
                        state.mark_limit_exceeded();
                        self.persist_state(job, &state).await?;
                        warn!(
                            iterations,
                            cap = job.cycles_remaining,
                            "iteration cap exceeded without convergence"
                        );
                        return Ok(ControllerOutcome::Failed(
                            self.report(job, FailureReason::CycleExceeded),
                        ));
                    } else {
                        state.reset_confidence();
                        debug!("pass did not converge; confidence reset");
                    }
                    self.persist_state(job, &state).await?;
                }
            }
        }

        self.finalize(job, &log_path).await
    }

    /// Run one pass with the solver's internal iteration limit capped,
    /// restoring the control file whether or not the run succeeds.
    async fn run_exploratory_pass(
        &self,
        job: &RelaxationJob,
        deadline_secs: u64,
    ) -> DomainResult<crate::domain::ports::RunCapture> {
        let param_path = self.workdir.join(self.adapter.param_file(&job.structure_id));
        let original = fs::read_to_string(&param_path)?;
        fs::write(
            &param_path,
            checkpoint::set_short_iteration_cap(&original, self.policy.exploratory_iter_cap),
        )?;

        let run = self
            .runner
            .run(self.adapter, job, &self.workdir, deadline_secs)
            .await;

        let overridden = fs::read_to_string(&param_path)?;
        fs::write(&param_path, checkpoint::restore_iteration_cap(&overridden))?;
        run
    }

    fn toggle_constraints(&self, job: &RelaxationJob, pass: u32) -> DomainResult<()> {
        let cell_path = self.workdir.join(self.adapter.cell_file(&job.structure_id));
        let cell = fs::read_to_string(&cell_path)?;
        // The first alternating pass releases the cell; odd passes pin it.
        let toggled = if pass % 2 == 0 {
            checkpoint::constraints_off(&cell)
        } else {
            checkpoint::constraints_on(&cell)
        };
        checkpoint::write_cell_atomic(&self.workdir, &job.structure_id, &toggled)
    }

    /// The window cannot fit even a minimal run: bounce the job back to
    /// the queue untouched, with a priority boost so another worker in a
    /// fresh window picks it up early.
    async fn insufficient_time(
        &self,
        job: &RelaxationJob,
        cycles_remaining: u32,
    ) -> DomainResult<ControllerOutcome> {
        if job.insufficient_time_launches + 1 > self.policy.max_insufficient_time_launches {
            warn!(
                bounces = job.insufficient_time_launches,
                "insufficient-time bounce limit reached"
            );
            return Ok(ControllerOutcome::Failed(
                self.report(job, FailureReason::InsufficientTime),
            ));
        }
        if !job.can_launch_successor() {
            return Ok(ControllerOutcome::Failed(
                self.report(job, FailureReason::LaunchLimitExceeded),
            ));
        }
        let input_state = self.current_input_state(job)?;
        let successor = ContinuationBuilder::build(
            job,
            input_state,
            cycles_remaining,
            self.policy.insufficient_time_priority_offset,
            ContinuationReason::InsufficientTime,
        );
        info!(
            priority = successor.priority,
            "insufficient time in window; continuation built"
        );
        Ok(ControllerOutcome::AwaitingContinuation {
            job: successor,
            reason: ContinuationReason::InsufficientTime,
        })
    }

    /// The solver was killed at the deadline. Checkpoint whatever the
    /// trajectory holds and hand the lineage to a continuation, unless
    /// too little cycle budget remains for one to be worth launching.
    async fn handle_timeout(
        &self,
        job: &RelaxationJob,
        state: &RelaxationState,
    ) -> DomainResult<ControllerOutcome> {
        let log_path = self.log_path(job);
        info!("deadline hit; solver killed, checkpointing");

        let mut new_cycles = 0;
        if !job.is_single_pass() {
            let completed = OutcomeClassifier::completed_iteration_count(&log_path).unwrap_or(0);
            let remaining = job.cycles_remaining.saturating_sub(completed);
            if remaining < self.policy.min_continuation_cycles {
                // A truncated output structure must not survive to be
                // mistaken for a converged one.
                checkpoint::discard_out_cell(&self.workdir, &job.structure_id)?;
                warn!(
                    remaining,
                    floor = self.policy.min_continuation_cycles,
                    "too few cycles left to justify a continuation"
                );
                return Ok(ControllerOutcome::Failed(
                    self.report(job, FailureReason::CycleExceeded),
                ));
            }
            new_cycles = remaining;
        }

        if !job.can_launch_successor() {
            warn!(
                launches = job.launch_count + 1,
                limit = job.launch_limit,
                "launch limit reached"
            );
            return Ok(ControllerOutcome::Failed(
                self.report(job, FailureReason::LaunchLimitExceeded),
            ));
        }

        self.persist_state(job, state).await?;
        self.upload_partial_log(job, &log_path).await?;

        let Some(content) = checkpoint::extract_latest_geometry(&self.workdir, &job.structure_id)?
        else {
            warn!("no checkpoint written before the deadline");
            return Ok(ControllerOutcome::Failed(
                self.report(job, FailureReason::Errored),
            ));
        };
        checkpoint::write_cell_atomic(&self.workdir, &job.structure_id, &content)?;

        let input_state = self.current_input_state(job)?;
        let successor = ContinuationBuilder::build(
            job,
            input_state,
            new_cycles,
            self.policy.continuation_priority_offset,
            ContinuationReason::TimedOut,
        );
        info!(
            cycles = new_cycles,
            launch = successor.launch_count,
            "continuation built from checkpoint"
        );
        Ok(ControllerOutcome::AwaitingContinuation {
            job: successor,
            reason: ContinuationReason::TimedOut,
        })
    }

    async fn finalize(&self, job: &RelaxationJob, log_path: &Path) -> DomainResult<ControllerOutcome> {
        let cell = fs::read_to_string(self.workdir.join(self.adapter.cell_file(&job.structure_id)))?;
        let scalars = OutcomeClassifier::final_scalars(log_path);

        self.store
            .put(
                &StoreKey::new(&job.structure_id, ArtifactKind::RelaxedGeometry),
                cell.clone().into_bytes(),
                true,
            )
            .await?;
        match self
            .store
            .delete(&StoreKey::new(&job.structure_id, ArtifactKind::ControllerState))
            .await
        {
            Err(RelaxError::NotFound(_)) => {}
            other => other?,
        }

        info!(
            enthalpy = ?scalars.enthalpy,
            launches = job.launch_count + 1,
            "relaxation converged"
        );
        Ok(ControllerOutcome::Done(RelaxedResult {
            structure_id: job.structure_id.clone(),
            cell,
            enthalpy: scalars.enthalpy,
            pressure: scalars.pressure,
            volume: scalars.volume,
            launch_count: job.launch_count + 1,
        }))
    }

    /// Drop stale exploratory overrides a crash may have left behind and
    /// make sure output structures are requested at all.
    fn normalize_control_file(&self, job: &RelaxationJob) -> DomainResult<()> {
        let param_path = self.workdir.join(self.adapter.param_file(&job.structure_id));
        let param = fs::read_to_string(&param_path)?;
        let normalized = checkpoint::normalize_param(&param);
        if normalized != param {
            fs::write(&param_path, normalized)?;
        }
        Ok(())
    }

    /// Cycle budget left mid-run, for continuations built before a pass
    /// could start.
    fn remaining_cycles(&self, job: &RelaxationJob, log_path: &Path) -> u32 {
        if job.is_single_pass() {
            return 0;
        }
        let completed = OutcomeClassifier::completed_iteration_count(log_path).unwrap_or(0);
        job.cycles_remaining.saturating_sub(completed)
    }

    /// Usable deadline for one run: the oracle's figure minus the
    /// kill-and-cleanup safety offset.
    async fn deadline(&self) -> DomainResult<i64> {
        let remaining = self.oracle.remaining_seconds().await?;
        Ok(remaining - self.adapter.safety_offset() as i64)
    }

    fn log_path(&self, job: &RelaxationJob) -> PathBuf {
        self.workdir.join(self.adapter.log_file(&job.structure_id))
    }

    fn current_input_state(&self, job: &RelaxationJob) -> DomainResult<InputState> {
        let cell = fs::read_to_string(self.workdir.join(self.adapter.cell_file(&job.structure_id)))?;
        let param = fs::read_to_string(self.workdir.join(self.adapter.param_file(&job.structure_id)))?;
        Ok(InputState { cell, param })
    }

    fn report(&self, job: &RelaxationJob, reason: FailureReason) -> TerminalReport {
        let log_path = self.log_path(job);
        TerminalReport {
            structure_id: job.structure_id.clone(),
            reason,
            launch_count: job.launch_count + 1,
            log_excerpt: OutcomeClassifier::last_log_excerpt(&log_path),
        }
    }

    async fn load_state(&self, job: &RelaxationJob) -> DomainResult<RelaxationState> {
        let key = StoreKey::new(&job.structure_id, ArtifactKind::ControllerState);
        match self.store.get(&key).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(RelaxError::NotFound(_)) => Ok(RelaxationState::for_job(
                job.cycles_remaining,
                self.policy.exploratory_cycles,
            )),
            Err(err) => Err(err),
        }
    }

    async fn persist_state(&self, job: &RelaxationJob, state: &RelaxationState) -> DomainResult<()> {
        let key = StoreKey::new(&job.structure_id, ArtifactKind::ControllerState);
        let bytes = serde_json::to_vec(state)?;
        self.store.put(&key, bytes, true).await
    }

    /// Park the cumulative solver log in the store so a continuation
    /// picked up on another host keeps its iteration history.
    async fn upload_partial_log(&self, job: &RelaxationJob, log_path: &Path) -> DomainResult<()> {
        let Ok(bytes) = fs::read(log_path) else {
            return Ok(());
        };
        let key = StoreKey::new(&job.structure_id, ArtifactKind::SolverLog);
        match self.store.put(&key, bytes.clone(), false).await {
            Err(RelaxError::AlreadyExists(_)) => {
                // A crash between a previous upload and its retrieval
                // left a stale copy; the newest log wins.
                warn!(key = %key, "stale partial log found; replacing");
                self.store.put(&key, bytes, true).await
            }
            other => other,
        }
    }

    /// A terminally failed lineage leaves nothing in the store: a later
    /// manual resubmission of the same structure would otherwise inherit
    /// the dead lineage's parked log and mid-policy state.
    async fn discard_artifacts(&self, job: &RelaxationJob) {
        for kind in [ArtifactKind::SolverLog, ArtifactKind::ControllerState] {
            let key = StoreKey::new(&job.structure_id, kind);
            match self.store.delete(&key).await {
                Ok(()) | Err(RelaxError::NotFound(_)) => {}
                Err(err) => warn!(key = %key, error = %err, "failed to discard artifact"),
            }
        }
    }

    /// Inverse of `upload_partial_log`, run once at the start of every
    /// continuation launch.
    async fn restore_partial_log(&self, job: &RelaxationJob) -> DomainResult<()> {
        let key = StoreKey::new(&job.structure_id, ArtifactKind::SolverLog);
        match self.store.get(&key).await {
            Ok(bytes) => {
                let log_path = self.log_path(job);
                if !log_path.exists() {
                    fs::write(&log_path, bytes)?;
                }
                match self.store.delete(&key).await {
                    Err(RelaxError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
            Err(RelaxError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
