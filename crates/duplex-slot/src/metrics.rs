//! Per-application refresh counters.
//!
//! [`RefreshMetrics`] accumulates across the lifetime of a registration.
//! The driver updates it on every tick; diagnostics hand out clones.

/// Cumulative tick counters plus figures from the most recent publish.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshMetrics {
    /// Ticks processed, whatever their outcome.
    pub ticks: u64,
    /// Successful rebuilds that were published.
    pub publishes: u64,
    /// Ticks ended by a staleness check reporting no update.
    pub no_update_ticks: u64,
    /// Staleness checks that reported `Failed`.
    pub stale_check_failures: u64,
    /// Rebuilds forced after too many consecutive failed checks.
    pub forced_rebuilds: u64,
    /// Rebuilds that returned an error (or exhausted the arena).
    pub rebuild_failures: u64,
    /// Rebuild failures caused by lock contention on the input.
    pub contention_retries: u64,
    /// Ticks skipped because a reader still pinned the reserved slot.
    pub pinned_skips: u64,
    /// Publishes whose arena usage crossed the warning threshold.
    pub capacity_warnings: u64,
    /// Duration of the last successful rebuild, in microseconds.
    pub last_rebuild_us: u64,
    /// Arena usage of the last published slot, in percent.
    pub last_used_percent: u8,
}
