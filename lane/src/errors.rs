// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words maxfiles taskthreads

//! Two-tier typed errors for the lane surface: a lifecycle shell wrapping a lane leaf.
//! See [`LifecycleError`], [`LaneError`], and [`LaneSpawnError`].
//!
//! # Why Two Tiers?
//!
//! Callers pattern-match on lifecycle concerns (cancelled? shutting down? timed out?)
//! without conflating them with infrastructure failures, and infrastructure failures
//! stay distinct from the *operation's* error type, which never surfaces here at all -
//! it arrives inside the boxed `Result` payload with its type preserved.
//!
//! | Tier                 | Type                | Carried as                        |
//! | :------------------- | :------------------ | :-------------------------------- |
//! | Lifecycle            | [`LifecycleError`]  | Flat cases of the returned error  |
//! | Lane infrastructure  | [`LaneError`]       | [`LifecycleError::Failure`]       |
//! | Operation error      | caller's `E`        | Inside the boxed `Result<T, E>`   |
//!
//! Lifecycle cases are never nested inside [`Failure`].
//!
//! [`Failure`]: LifecycleError::Failure

/// Infrastructure failures of a lane, distinct from lifecycle outcomes.
///
/// These appear on the surface as [`LifecycleError::Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum LaneError {
    /// The job queue was full and the lane's strategy is fail-fast.
    #[error("lane job queue is full")]
    #[diagnostic(
        code(r3bl_lane::queue_full),
        help(
            "The lane is saturated. Retry later, raise the queue limit, or switch the \
             backpressure strategy to `Wait` to suspend instead of failing."
        )
    )]
    QueueFull,

    /// Every backpressure stage was exhausted: the job queue and the acceptance
    /// waiter queue are both at capacity (or the pool has no live workers left).
    #[error("lane is overloaded")]
    #[diagnostic(
        code(r3bl_lane::overloaded),
        help(
            "Both the job queue and the acceptance waiter queue are full. The lane is \
             accepting work faster than its workers can drain it - add workers, shard \
             the lane, or shed load upstream."
        )
    )]
    Overloaded,

    /// The lane's own state-transition discipline was violated.
    ///
    /// Only reachable through a bug in this crate (or an operation panic escaping the
    /// worker-side quarantine). The violation is logged at `error` level and
    /// propagates as a value; the lane never aborts the process.
    #[error("lane internal invariant violated")]
    #[diagnostic(
        code(r3bl_lane::internal_invariant),
        help(
            "This indicates a bug in r3bl_lane (or a panicking operation). Please file \
             an issue with the surrounding logs."
        )
    )]
    InternalInvariantViolation,
}

/// The lifecycle shell around a lane-leaf error `E`.
///
/// The variants are flat: a cancelled run is [`Cancelled`], never
/// `Failure(cancelled)`. The generic parameter lets composed surfaces keep their own
/// leaf type; the lane surface itself always throws [`LaneFailure`].
///
/// [`Cancelled`]: Self::Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError<E> {
    /// The submission was cancelled before a result could be delivered.
    ///
    /// In async Rust cancellation is dropping the in-flight future, so this value is
    /// mostly observed through the job's terminal state and `cancelled_total` rather
    /// than by the (gone) caller. It is still delivered into the completion slot so
    /// the race outcome is recorded exactly once.
    #[error("operation was cancelled")]
    Cancelled,

    /// The lane is shutting down and no longer accepts submissions.
    #[error("lane is shutting down")]
    ShutdownInProgress,

    /// A deadline expired: the acceptance deadline while waiting for a queue slot, or
    /// the execution timeout on an abandoning lane.
    #[error("deadline expired")]
    Timeout,

    /// A lane-leaf failure. Never wraps another lifecycle case.
    #[error("lane failure: {0}")]
    Failure(E),
}

/// What the lane surface throws: the lifecycle shell around [`LaneError`].
pub type LaneFailure = LifecycleError<LaneError>;

/// Errors from the lane factories ([`Lane::threads()`], [`Lane::abandoning()`],
/// [`Lane::sharded()`]).
///
/// [`Lane::abandoning()`]: crate::Lane::abandoning
/// [`Lane::sharded()`]: crate::Lane::sharded
/// [`Lane::threads()`]: crate::Lane::threads
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LaneSpawnError {
    /// [`std::thread::Builder::spawn()`] failed while creating a worker thread.
    #[error("failed to spawn lane worker thread")]
    #[diagnostic(code(r3bl_lane::thread_spawn))]
    #[cfg_attr(
        target_os = "linux",
        diagnostic(help(
            "The system may have reached its thread limit - \
             check `ulimit -u` for per-user limit, \
             `cat /proc/sys/kernel/threads-max` for system-wide limit"
        ))
    )]
    #[cfg_attr(
        target_os = "macos",
        diagnostic(help(
            "The system may have reached its thread limit - \
             check `ulimit -u` for per-user limit, \
             `sysctl kern.num_taskthreads` for per-process limit"
        ))
    )]
    #[cfg_attr(
        target_os = "windows",
        diagnostic(help(
            "The system may have reached its thread limit - \
             check Task Manager for thread count, \
             or use `Get-Process` in PowerShell to inspect per-process threads"
        ))
    )]
    ThreadSpawn(#[source] std::io::Error),

    /// A sharded lane was asked for zero shards, or a shard factory failed.
    #[error("sharded lane construction failed: {reason}")]
    #[diagnostic(code(r3bl_lane::sharding))]
    Sharding {
        /// Human-readable cause.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_display_is_flat() {
        let failure: LaneFailure = LifecycleError::Failure(LaneError::QueueFull);
        assert_eq!(failure.to_string(), "lane failure: lane job queue is full");
        assert_eq!(
            LaneFailure::ShutdownInProgress.to_string(),
            "lane is shutting down"
        );
    }

    #[test]
    fn lifecycle_preserves_a_custom_leaf_type() {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
        #[error("custom leaf")]
        struct CustomLeaf;

        let failure: LifecycleError<CustomLeaf> = LifecycleError::Failure(CustomLeaf);
        assert_eq!(failure, LifecycleError::Failure(CustomLeaf));
    }
}
