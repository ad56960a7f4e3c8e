//! In-memory job queue.
//!
//! Priority-ordered, single-process. Real deployments put a shared
//! workflow engine behind the `JobQueue` port; this implementation backs
//! local runs and the integration tests, and defines the reference
//! semantics: higher priority first, FIFO within a priority band, and a
//! job is consumed exactly once.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::errors::{DomainResult, RelaxError};
use crate::domain::models::RelaxationJob;
use crate::domain::ports::{JobDisposition, JobHandle, JobQueue};

#[derive(Default)]
struct QueueInner {
    pending: Vec<(JobHandle, RelaxationJob)>,
    running: HashMap<JobHandle, RelaxationJob>,
    terminal: HashMap<JobHandle, JobDisposition>,
}

#[derive(Default)]
pub struct MemoryJobQueue {
    inner: Mutex<QueueInner>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal disposition of a consumed job, if it has one yet.
    pub async fn disposition(&self, handle: JobHandle) -> Option<JobDisposition> {
        self.inner.lock().await.terminal.get(&handle).cloned()
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn submit(&self, job: RelaxationJob) -> DomainResult<JobHandle> {
        job.validate().map_err(RelaxError::Parse)?;
        let handle = JobHandle::new();
        debug!(
            handle = %handle,
            structure_id = %job.structure_id,
            priority = job.priority,
            "job submitted"
        );
        self.inner.lock().await.pending.push((handle, job));
        Ok(handle)
    }

    async fn fetch_next(&self) -> DomainResult<Option<(JobHandle, RelaxationJob)>> {
        let mut inner = self.inner.lock().await;
        // Highest priority wins; among equals the earliest submission.
        let best = inner
            .pending
            .iter()
            .enumerate()
            .max_by(|(ia, (_, a)), (ib, (_, b))| {
                a.priority
                    .cmp(&b.priority)
                    .then(ib.cmp(ia))
            })
            .map(|(i, _)| i);
        let Some(index) = best else {
            return Ok(None);
        };
        let (handle, job) = inner.pending.remove(index);
        inner.running.insert(handle, job.clone());
        Ok(Some((handle, job)))
    }

    async fn mark_terminal(
        &self,
        handle: JobHandle,
        disposition: JobDisposition,
    ) -> DomainResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.running.remove(&handle).is_none() && !inner.terminal.contains_key(&handle) {
            return Err(RelaxError::NotFound(format!("job handle {handle}")));
        }
        inner.terminal.insert(handle, disposition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::InputState;

    fn job(id: &str, priority: i64) -> RelaxationJob {
        RelaxationJob::new(
            id,
            InputState {
                cell: "cell\n".to_string(),
                param: "param\n".to_string(),
            },
            100,
        )
        .with_priority(priority)
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let queue = MemoryJobQueue::new();
        queue.submit(job("low", 0)).await.unwrap();
        queue.submit(job("high", 10)).await.unwrap();
        queue.submit(job("mid", 5)).await.unwrap();

        let order: Vec<String> = [
            queue.fetch_next().await.unwrap().unwrap().1,
            queue.fetch_next().await.unwrap().unwrap().1,
            queue.fetch_next().await.unwrap().unwrap().1,
        ]
        .into_iter()
        .map(|j| j.structure_id)
        .collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
        assert!(queue.fetch_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fifo_within_a_priority_band() {
        let queue = MemoryJobQueue::new();
        queue.submit(job("first", 5)).await.unwrap();
        queue.submit(job("second", 5)).await.unwrap();

        let (_, fetched) = queue.fetch_next().await.unwrap().unwrap();
        assert_eq!(fetched.structure_id, "first");
    }

    #[tokio::test]
    async fn test_mark_terminal_requires_consumed_job() {
        let queue = MemoryJobQueue::new();
        let handle = queue.submit(job("s1", 0)).await.unwrap();
        let report = crate::domain::models::TerminalReport {
            structure_id: "s1".to_string(),
            reason: crate::domain::models::FailureReason::Errored,
            launch_count: 1,
            log_excerpt: None,
        };

        // Not fetched yet
        let err = queue
            .mark_terminal(handle, JobDisposition::Failed { report: report.clone() })
            .await;
        assert!(matches!(err, Err(RelaxError::NotFound(_))));

        queue.fetch_next().await.unwrap();
        queue
            .mark_terminal(handle, JobDisposition::Failed { report })
            .await
            .unwrap();
        assert!(queue.disposition(handle).await.is_some());
    }

    #[tokio::test]
    async fn test_rejects_invalid_jobs() {
        let queue = MemoryJobQueue::new();
        let invalid = RelaxationJob::new("", InputState::default(), 0);
        assert!(queue.submit(invalid).await.is_err());
    }
}
