// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words gauges

//! Counters, gauges, latency aggregates, and queue-edge notifications. See
//! [`LaneMetrics`] and [`QueueTransition`].

use std::{sync::Arc, time::Duration};

/// A fixed-size latency aggregate: `{count, sum, min, max}` in nanoseconds.
///
/// Cheap enough to update under the lane lock on every sample; rich enough to derive
/// mean and spot outliers without a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyStats {
    /// Number of samples recorded.
    pub count: u64,
    /// Sum of all samples, in nanoseconds. Saturates instead of wrapping.
    pub sum_ns: u64,
    /// Smallest sample, in nanoseconds. Zero until the first sample.
    pub min_ns: u64,
    /// Largest sample, in nanoseconds.
    pub max_ns: u64,
}

impl LatencyStats {
    /// Records one sample.
    pub fn record(&mut self, sample: Duration) {
        let ns = u64::try_from(sample.as_nanos()).unwrap_or(u64::MAX);
        self.min_ns = if self.count == 0 {
            ns
        } else {
            self.min_ns.min(ns)
        };
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.saturating_add(ns);
        self.count += 1;
    }

    /// Folds another aggregate into this one. Used when summing shard snapshots.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        self.min_ns = if self.count == 0 {
            other.min_ns
        } else {
            self.min_ns.min(other.min_ns)
        };
        self.max_ns = self.max_ns.max(other.max_ns);
        self.sum_ns = self.sum_ns.saturating_add(other.sum_ns);
        self.count += other.count;
    }
}

/// Worker-thread accounting for one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerCounts {
    /// Total workers ever spawned, including respawned replacements.
    pub spawned: u64,
    /// Workers currently serving the pool. Excludes abandoned workers.
    pub active: usize,
    /// Workers abandoned after an execution timeout. Always zero on the threads
    /// runtime.
    pub abandoned: u64,
}

/// A point-in-time snapshot of one lane's counters, gauges, and latency aggregates.
///
/// Taking a snapshot is O(1) under the lane lock. Counters are monotonic; gauges are
/// instantaneous.
///
/// # Counter Relationships
///
/// `enqueued_total >= started_total >= completed_total`, and every accepted job ends in
/// exactly one of completed / cancelled / timed-out / failed, so the counters never
/// double-count an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneMetrics {
    /// Jobs placed into the job queue (directly or by waiter promotion).
    pub enqueued_total: u64,
    /// Jobs a worker started executing.
    pub started_total: u64,
    /// Jobs whose result was delivered to the caller.
    pub completed_total: u64,
    /// Submissions rejected with `QueueFull` under the fail-fast strategy.
    pub fail_fast_total: u64,
    /// Submissions rejected with `Overloaded` (waiter queue full, or pool dead).
    pub overloaded_total: u64,
    /// Jobs or waiters cancelled by the caller.
    pub cancelled_total: u64,
    /// Acceptance waiters promoted into the job queue.
    pub acceptance_promoted_total: u64,

    /// Current job queue depth.
    pub queue_depth: usize,
    /// Current number of suspended acceptance waiters.
    pub acceptance_waiters_depth: usize,
    /// Jobs currently executing on a worker. Moves on the start transition, not on
    /// waiter promotion.
    pub executing_count: usize,

    /// Enqueue to worker-start latency.
    pub enqueue_to_start: LatencyStats,
    /// Operation execution latency.
    pub execution: LatencyStats,
    /// Time spent suspended as an acceptance waiter.
    pub acceptance_wait: LatencyStats,

    /// Worker-thread accounting.
    pub workers: WorkerCounts,
}

impl LaneMetrics {
    /// Folds another lane's snapshot into this one. Used by sharded lanes, which
    /// expose aggregates only.
    pub fn absorb(&mut self, other: &Self) {
        self.enqueued_total += other.enqueued_total;
        self.started_total += other.started_total;
        self.completed_total += other.completed_total;
        self.fail_fast_total += other.fail_fast_total;
        self.overloaded_total += other.overloaded_total;
        self.cancelled_total += other.cancelled_total;
        self.acceptance_promoted_total += other.acceptance_promoted_total;
        self.queue_depth += other.queue_depth;
        self.acceptance_waiters_depth += other.acceptance_waiters_depth;
        self.executing_count += other.executing_count;
        self.enqueue_to_start.merge(&other.enqueue_to_start);
        self.execution.merge(&other.execution);
        self.acceptance_wait.merge(&other.acceptance_wait);
        self.workers.spawned += other.workers.spawned;
        self.workers.active += other.workers.active;
        self.workers.abandoned += other.workers.abandoned;
    }
}

/// An edge transition of the job queue's depth.
///
/// Any depth change emits zero or more of these through the lane's transition
/// callback. Edges, not levels: a callback fires when the queue *becomes* empty, not
/// on every pop that leaves it empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTransition {
    /// Depth went from non-zero to zero.
    BecameEmpty,
    /// Depth went from zero to non-zero.
    BecameNonEmpty,
    /// Depth reached the queue limit.
    BecameSaturated,
    /// Depth left the queue limit.
    BecameNotSaturated,
}

/// Observer invoked on queue-edge transitions.
///
/// Called after the lane lock is released, so implementations may take their own locks
/// freely; consequently edges from concurrent mutations may arrive reordered. Use for
/// observability, not for synchronization.
pub type TransitionCallback = Arc<dyn Fn(QueueTransition) + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn latency_records_min_max_sum() {
        let mut stats = LatencyStats::default();
        stats.record(Duration::from_nanos(200));
        stats.record(Duration::from_nanos(50));
        stats.record(Duration::from_nanos(100));
        assert_eq!(
            stats,
            LatencyStats {
                count: 3,
                sum_ns: 350,
                min_ns: 50,
                max_ns: 200,
            }
        );
    }

    #[test]
    fn latency_merge_handles_empty_sides() {
        let mut stats = LatencyStats::default();
        stats.merge(&LatencyStats::default());
        assert_eq!(stats.count, 0);

        let mut filled = LatencyStats::default();
        filled.record(Duration::from_nanos(10));
        stats.merge(&filled);
        assert_eq!(stats.min_ns, 10);
        assert_eq!(stats.max_ns, 10);
    }

    #[test]
    fn absorb_sums_counters_and_gauges() {
        let mut left = LaneMetrics {
            enqueued_total: 2,
            queue_depth: 1,
            ..Default::default()
        };
        let right = LaneMetrics {
            enqueued_total: 3,
            queue_depth: 4,
            ..Default::default()
        };
        left.absorb(&right);
        assert_eq!(left.enqueued_total, 5);
        assert_eq!(left.queue_depth, 5);
    }
}
