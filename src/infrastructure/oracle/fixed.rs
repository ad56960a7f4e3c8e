//! Fixed-budget oracle for runs outside any batch scheduler.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::errors::DomainResult;
use crate::domain::ports::WallClockOracle;

/// Counts down from a budget fixed at construction time. Used for local
/// and interactive runs where no scheduler will kill us; the budget is
/// whatever the operator configured.
pub struct FixedBudgetOracle {
    started: Instant,
    budget_secs: i64,
}

impl FixedBudgetOracle {
    pub fn new(budget_secs: i64) -> Self {
        Self {
            started: Instant::now(),
            budget_secs,
        }
    }
}

#[async_trait]
impl WallClockOracle for FixedBudgetOracle {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn remaining_seconds(&self) -> DomainResult<i64> {
        let elapsed = self.started.elapsed().as_secs() as i64;
        Ok(self.budget_secs - elapsed)
    }
}
