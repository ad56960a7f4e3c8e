//! Continuation job construction.
//!
//! Builds the successor job for a lineage that could not finish within
//! its execution window. Pure value construction: the worker loop owns
//! the actual queue submission, so building a continuation twice (e.g.
//! after a crash between build and submit) costs nothing.

use crate::domain::models::{InputState, RelaxationJob};

/// Why a successor is being launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationReason {
    /// The solver ran and was killed at the deadline; progress was
    /// checkpointed.
    TimedOut,
    /// The window was too short to start at all; the job bounces with
    /// its inputs untouched.
    InsufficientTime,
}

impl ContinuationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimedOut => "timed_out",
            Self::InsufficientTime => "insufficient_time",
        }
    }
}

pub struct ContinuationBuilder;

impl ContinuationBuilder {
    /// Build the successor for `parent`.
    ///
    /// The successor keeps the lineage's identity and launch limit,
    /// consumes one launch, and is boosted above fresh work by
    /// `priority_offset` so resumed lineages drain before new ones
    /// start.
    pub fn build(
        parent: &RelaxationJob,
        input_state: InputState,
        cycles_remaining: u32,
        priority_offset: i64,
        reason: ContinuationReason,
    ) -> RelaxationJob {
        let mut successor = RelaxationJob::new(
            parent.structure_id.clone(),
            input_state,
            cycles_remaining,
        )
        .with_launch_limit(parent.launch_limit)
        .with_priority(parent.priority + priority_offset);

        successor.launch_count = parent.launch_count + 1;
        successor.insufficient_time_launches = match reason {
            ContinuationReason::InsufficientTime => parent.insufficient_time_launches + 1,
            ContinuationReason::TimedOut => parent.insufficient_time_launches,
        };
        successor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> RelaxationJob {
        let input = InputState {
            cell: "cell content".to_string(),
            param: "param content".to_string(),
        };
        let mut job = RelaxationJob::new("seed-007", input, 200)
            .with_launch_limit(5)
            .with_priority(100);
        job.launch_count = 2;
        job.insufficient_time_launches = 1;
        job
    }

    #[test]
    fn test_timeout_continuation_carries_lineage_forward() {
        let input = InputState {
            cell: "checkpointed cell".to_string(),
            param: "param content".to_string(),
        };
        let successor = ContinuationBuilder::build(
            &parent(),
            input.clone(),
            150,
            10,
            ContinuationReason::TimedOut,
        );

        assert_eq!(successor.structure_id, "seed-007");
        assert_eq!(successor.launch_count, 3);
        assert_eq!(successor.launch_limit, 5);
        assert_eq!(successor.cycles_remaining, 150);
        assert_eq!(successor.priority, 110);
        assert_eq!(successor.input_state, input);
        assert_eq!(successor.insufficient_time_launches, 1);
    }

    #[test]
    fn test_insufficient_time_bounce_counts_itself() {
        let p = parent();
        let successor = ContinuationBuilder::build(
            &p,
            p.input_state.clone(),
            p.cycles_remaining,
            15,
            ContinuationReason::InsufficientTime,
        );

        assert_eq!(successor.cycles_remaining, 200, "cycle budget untouched");
        assert_eq!(successor.priority, 115);
        assert_eq!(successor.insufficient_time_launches, 2);
    }

    #[test]
    fn test_building_twice_yields_equivalent_successors() {
        let p = parent();
        let a = ContinuationBuilder::build(
            &p,
            p.input_state.clone(),
            150,
            10,
            ContinuationReason::TimedOut,
        );
        let b = ContinuationBuilder::build(
            &p,
            p.input_state.clone(),
            150,
            10,
            ContinuationReason::TimedOut,
        );
        assert_eq!(a.launch_count, b.launch_count);
        assert_eq!(a.priority, b.priority);
        assert_eq!(a.input_state, b.input_state);
    }
}
