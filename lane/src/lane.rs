// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words unbox unboxed

//! The public lane surface: a uniform, capability-tagged contract for "run this
//! synchronous operation, give me a typed result asynchronously". See [`Lane`].

use crate::{AbandoningLaneOptions, Capabilities, Deadline, HandoffBox, LaneError,
            LaneFailure, LaneMetrics, LaneSpawnError, LifecycleError,
            ThreadsLaneOptions,
            abandoning_lane::AbandoningLaneRuntime,
            inline_lane::InlineLane,
            pool::job::BoxedOperation,
            sharded_lane::ShardedLane,
            threads_lane::ThreadsLaneRuntime};
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// The type-erased primitive every lane runtime implements. The typed surface on
/// [`Lane`] boxes operations down to this and re-introduces the types at the unbox
/// site.
pub(crate) trait RawLane: Send + Sync + 'static {
    /// Submits a boxed operation; resolves when the terminal-CAS winner resumes the
    /// caller.
    fn run_boxed(
        self: Arc<Self>,
        deadline: Option<Deadline>,
        op: BoxedOperation,
    ) -> BoxFuture<'static, Result<HandoffBox, LaneFailure>>;

    /// Stops accepting work and resolves once the runtime's workers are done.
    /// Idempotent.
    fn shutdown(self: Arc<Self>) -> BoxFuture<'static, ()>;

    /// What this lane truthfully promises.
    fn capabilities(&self) -> Capabilities;

    /// O(1) snapshot of the lane's counters, gauges, and latency aggregates.
    fn metrics(&self) -> LaneMetrics;
}

/// A handle to one lane: cheap to clone, shareable across tasks, closeable exactly
/// once (further shutdowns are no-ops).
///
/// # The Contract
///
/// - `run*` suspends until the operation's result arrives (or a lifecycle error says
///   it never will). The operation itself runs synchronously, off the caller's
///   scheduler when [`Capabilities::executes_on_dedicated_threads`] says so.
/// - The operation's own error type is preserved: [`run_result`] hands back the exact
///   `Result<T, E>` the operation produced, inside the lane-level `Result`. Lane
///   errors and operation errors never mix.
/// - A `deadline` bounds **acceptance** only. Once accepted, the job runs no matter
///   how late it is (the abandoning runtime separately bounds execution).
/// - Dropping an in-flight `run*` future cancels the submission: an unstarted job is
///   skipped by workers, a started one runs to completion with its result destroyed.
///   Either way the job resolves exactly once.
///
/// # Choosing a Runtime
///
/// | Factory          | Threads                 | Semantics                     |
/// | :--------------- | :---------------------- | :---------------------------- |
/// | [`threads()`]    | Fixed dedicated pool    | Guaranteed                    |
/// | [`abandoning()`] | Respawning pool         | Abandon on execution timeout  |
/// | [`sharded()`]    | Per-shard               | Weakest of the shards         |
/// | [`inline()`]     | Caller's thread (tests) | Guaranteed                    |
///
/// [`abandoning()`]: Self::abandoning
/// [`inline()`]: Self::inline
/// [`run_result`]: Self::run_result
/// [`sharded()`]: Self::sharded
/// [`threads()`]: Self::threads
#[derive(Clone)]
pub struct Lane {
    raw: Arc<dyn RawLane>,
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

impl Lane {
    /// A lane over the default dedicated-thread pool. See [`ThreadsLaneOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`LaneSpawnError::ThreadSpawn`] if a worker thread cannot be spawned.
    pub fn threads(options: ThreadsLaneOptions) -> Result<Self, LaneSpawnError> {
        Ok(Self {
            raw: Arc::new(ThreadsLaneRuntime::new(options)?),
        })
    }

    /// A lane over the fault-tolerant abandon-on-timeout pool. See
    /// [`AbandoningLaneOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`LaneSpawnError::ThreadSpawn`] if a worker thread cannot be spawned.
    pub fn abandoning(options: AbandoningLaneOptions) -> Result<Self, LaneSpawnError> {
        Ok(Self {
            raw: Arc::new(AbandoningLaneRuntime::new(options)?),
        })
    }

    /// A lane composed of `shard_count` independent sub-lanes built by `shard_factory`
    /// (called with the shard index), dispatched round-robin.
    ///
    /// # Errors
    ///
    /// Returns [`LaneSpawnError::Sharding`] for a zero shard count, or the factory's
    /// error for the first shard that fails to build.
    pub fn sharded(
        shard_count: usize,
        mut shard_factory: impl FnMut(usize) -> Result<Self, LaneSpawnError>,
    ) -> Result<Self, LaneSpawnError> {
        if shard_count == 0 {
            return Err(LaneSpawnError::Sharding {
                reason: "shard count must be at least 1",
            });
        }
        let mut shards = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            shards.push(shard_factory(index)?);
        }
        Ok(Self {
            raw: Arc::new(ShardedLane::new(shards)),
        })
    }

    /// A lane that runs operations synchronously on the caller. For tests.
    #[must_use]
    pub fn inline() -> Self {
        Self {
            raw: Arc::new(InlineLane::new()),
        }
    }

    /// Runs a non-fallible operation, returning its value.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle error that prevented delivery: `ShutdownInProgress`,
    /// `Timeout` (acceptance deadline, or execution timeout on an abandoning lane),
    /// or `Failure` with the lane-leaf cause.
    pub async fn run<T, F>(
        &self,
        deadline: Option<Deadline>,
        op: F,
    ) -> Result<T, LaneFailure>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let result_box = self
            .run_boxed(deadline, move || HandoffBox::new(op()))
            .await?;
        unbox(result_box.take_value::<T>())
    }

    /// Runs a fallible operation, returning the exact `Result<T, E>` it produced.
    /// The operation's error type `E` never surfaces as a lane error.
    ///
    /// # Errors
    ///
    /// As [`run`]; the operation's own `Err(E)` arrives in the `Ok` payload.
    ///
    /// [`run`]: Self::run
    pub async fn run_result<T, E, F>(
        &self,
        deadline: Option<Deadline>,
        op: F,
    ) -> Result<Result<T, E>, LaneFailure>
    where
        T: Send + 'static,
        E: Send + 'static,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let result_box = self
            .run_boxed(deadline, move || HandoffBox::from_result(op()))
            .await?;
        unbox(result_box.take_result::<T, E>())
    }

    /// The type-erased primitive under the typed wrappers: the operation produces a
    /// [`HandoffBox`] and the caller gets it back opaque. Composite lanes route
    /// through this to avoid re-boxing; most callers want [`run`] or [`run_result`].
    ///
    /// # Errors
    ///
    /// As [`run`].
    ///
    /// [`run`]: Self::run
    /// [`run_result`]: Self::run_result
    pub async fn run_boxed(
        &self,
        deadline: Option<Deadline>,
        op: impl FnOnce() -> HandoffBox + Send + 'static,
    ) -> Result<HandoffBox, LaneFailure> {
        Arc::clone(&self.raw).run_boxed(deadline, Box::new(op)).await
    }

    /// Forwards an already-boxed operation without another layer of boxing. Used by
    /// the sharded lane.
    pub(crate) fn submit_boxed(
        &self,
        deadline: Option<Deadline>,
        op: BoxedOperation,
    ) -> BoxFuture<'static, Result<HandoffBox, LaneFailure>> {
        Arc::clone(&self.raw).run_boxed(deadline, op)
    }

    /// Stops accepting submissions and suspends until the lane's workers are done.
    ///
    /// Already-accepted jobs run to completion first; suspended acceptance waiters
    /// are resumed with `ShutdownInProgress`. Idempotent: a second call returns once
    /// the first is complete.
    pub async fn shutdown(&self) { Arc::clone(&self.raw).shutdown().await; }

    /// What this lane truthfully promises.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities { self.raw.capabilities() }

    /// O(1) snapshot of counters, gauges, and latency aggregates.
    #[must_use]
    pub fn metrics(&self) -> LaneMetrics { self.raw.metrics() }
}

/// The unbox site: the one place where a type mismatch between producer and consumer
/// could be observed. It cannot happen while the typed wrappers are the only
/// producers; if it does, the CAS/box discipline was broken somewhere.
fn unbox<T>(taken: Option<T>) -> Result<T, LaneFailure> {
    match taken {
        Some(value) => Ok(value),
        None => {
            tracing::error!("handoff box payload type mismatch at unbox site");
            Err(LifecycleError::Failure(LaneError::InternalInvariantViolation))
        }
    }
}
