//! Wall-clock oracle port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Answers "how many seconds until forced termination".
///
/// Implementations must be interchangeable: a fixed-budget stand-in for
/// interactive use, or a live adapter querying the surrounding batch
/// scheduler. Live adapters must compute `scheduled_end_time - now` with
/// both sides timezone-aware.
#[async_trait]
pub trait WallClockOracle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Seconds remaining before the enclosing environment kills us.
    ///
    /// Fails with `RelaxError::NoScheduleContext` when invoked outside a
    /// recognized execution environment.
    async fn remaining_seconds(&self) -> DomainResult<i64>;
}
