//! Run outcomes and the multi-stage restart policy's persisted state.

use serde::{Deserialize, Serialize};

/// Classification of one invocation of the external solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Process exited within the deadline and the log carries the
    /// solver's definitive success marker.
    Finished,
    /// The deadline was hit and the process had to be killed. Log
    /// content is irrelevant in this case.
    TimedOut,
    /// Exited within the deadline but without the success marker.
    Errored,
    /// Internal default before classification runs; never returned to
    /// callers.
    Undetermined,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::TimedOut => "timed_out",
            Self::Errored => "errored",
            Self::Undetermined => "undetermined",
        }
    }
}

/// Mutable state of the multi-stage restart policy, persisted after every
/// iteration so a crash mid-job resumes exactly where it left off.
///
/// The `success_counter` counts down required consecutive successful
/// production passes: `> 1` means keep looping, reaching `1` is the
/// terminal success, `-1` is the limit-exceeded sentinel. Exactly one of
/// these holds after each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaxationState {
    /// Exploratory short-cycle iterations still to run before switching
    /// to production mode.
    pub short_cycles_remaining: u32,
    pub success_counter: i32,
}

/// Counter value requiring two fresh consecutive successes.
const NEED_TWO_MORE: i32 = 3;
/// Counter value in single-pass mode: one success is enough.
const NEED_ONE_MORE: i32 = 2;
const CONVERGED: i32 = 1;
const LIMIT_EXCEEDED: i32 = -1;

impl RelaxationState {
    /// Initial state for a job. A zero cycle cap selects single-pass
    /// mode: no exploratory phase and only one success required.
    pub fn for_job(cycles_remaining: u32, exploratory_cycles: u32) -> Self {
        if cycles_remaining == 0 {
            Self {
                short_cycles_remaining: 0,
                success_counter: NEED_ONE_MORE,
            }
        } else {
            Self {
                short_cycles_remaining: exploratory_cycles,
                success_counter: NEED_TWO_MORE,
            }
        }
    }

    /// Consume one successful production pass.
    pub fn record_success(&mut self) {
        if self.success_counter > CONVERGED {
            self.success_counter -= 1;
        }
    }

    /// A non-success mid-stream does not carry over confidence: two
    /// fresh consecutive successes are required again.
    pub fn reset_confidence(&mut self) {
        self.success_counter = NEED_TWO_MORE;
    }

    pub fn mark_limit_exceeded(&mut self) {
        self.success_counter = LIMIT_EXCEEDED;
    }

    pub fn is_converged(&self) -> bool {
        self.success_counter == CONVERGED
    }

    pub fn is_limit_exceeded(&self) -> bool {
        self.success_counter <= LIMIT_EXCEEDED
    }

    pub fn needs_more_passes(&self) -> bool {
        self.success_counter > CONVERGED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_capped_job_needs_two_consecutive_successes() {
        let mut state = RelaxationState::for_job(200, 4);
        assert_eq!(state.short_cycles_remaining, 4);
        assert!(state.needs_more_passes());

        state.record_success();
        assert!(state.needs_more_passes(), "one success is not enough");
        state.record_success();
        assert!(state.is_converged());
    }

    #[test]
    fn test_single_pass_mode_needs_one_success() {
        let mut state = RelaxationState::for_job(0, 4);
        assert_eq!(state.short_cycles_remaining, 0, "exploratory phase skipped");

        state.record_success();
        assert!(state.is_converged());
    }

    #[test]
    fn test_reset_demands_two_fresh_successes() {
        let mut state = RelaxationState::for_job(200, 4);
        state.record_success();
        state.reset_confidence();
        state.record_success();
        assert!(state.needs_more_passes());
        state.record_success();
        assert!(state.is_converged());
    }

    #[test]
    fn test_limit_exceeded_is_terminal() {
        let mut state = RelaxationState::for_job(200, 4);
        state.mark_limit_exceeded();
        assert!(state.is_limit_exceeded());
        assert!(!state.is_converged());
        assert!(!state.needs_more_passes());
    }

    #[test]
    fn test_converged_state_does_not_decrement_further() {
        let mut state = RelaxationState::for_job(0, 4);
        state.record_success();
        state.record_success();
        assert!(state.is_converged());
    }

    proptest! {
        /// After any sequence of successes and resets, exactly one of
        /// the three classifications holds.
        #[test]
        fn prop_exactly_one_classification(ops in proptest::collection::vec(0u8..3, 0..50)) {
            let mut state = RelaxationState::for_job(100, 4);
            for op in ops {
                match op {
                    0 => state.record_success(),
                    1 => state.reset_confidence(),
                    _ => state.mark_limit_exceeded(),
                }
                let classes = [
                    state.needs_more_passes(),
                    state.is_converged(),
                    state.is_limit_exceeded(),
                ];
                prop_assert_eq!(classes.iter().filter(|c| **c).count(), 1);
            }
        }

        /// Convergence is reached iff two consecutive successes occur
        /// with no intervening reset.
        #[test]
        fn prop_consecutive_successes(ops in proptest::collection::vec(proptest::bool::ANY, 1..40)) {
            let mut state = RelaxationState::for_job(100, 4);
            let mut streak = 0u32;
            let mut expect_converged = false;
            for success in ops {
                if state.is_converged() {
                    break;
                }
                if success {
                    state.record_success();
                    streak += 1;
                } else {
                    state.reset_confidence();
                    streak = 0;
                }
                if streak >= 2 {
                    expect_converged = true;
                }
                prop_assert_eq!(state.is_converged(), expect_converged);
            }
        }
    }
}
