// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words respawn respawns

//! Runtime factory, abandonment accounting, and respawn logic for the abandoning
//! runtime.

use super::{AbandoningLaneOptions, worker};
use crate::{Capabilities, Deadline, ExecutionSemantics, HandoffBox, LaneFailure,
            LaneMetrics, LaneSpawnError, LifecycleError,
            lane::RawLane,
            pool::{core::{PoolCore, PoolSettings},
                   job::{BoxedOperation, Job}}};
use futures_util::future::BoxFuture;
use std::{sync::Arc, time::Duration};

/// State shared by the runtime handle, every worker, and every watchdog.
#[allow(missing_debug_implementations)]
pub(crate) struct AbandoningShared {
    pub(crate) core: Arc<PoolCore>,
    pub(crate) execution_timeout: Duration,
    max_workers: u64,
}

/// Registers and spawns one worker thread.
///
/// # Errors
///
/// Returns [`LaneSpawnError::ThreadSpawn`] (with the registration rolled back) if the
/// OS refuses the thread.
pub(crate) fn spawn_worker(shared: &Arc<AbandoningShared>) -> Result<(), LaneSpawnError> {
    let generation = shared.core.register_worker();
    let shared_for_thread = Arc::clone(shared);
    let spawned = std::thread::Builder::new()
        .name(format!("lane-worker-g{generation}"))
        .spawn(move || worker::run_worker_loop(shared_for_thread, generation));
    if let Err(io_error) = spawned {
        shared.core.rollback_worker_registration();
        return Err(LaneSpawnError::ThreadSpawn(io_error));
    }
    Ok(())
}

/// Called by a watchdog that won the `Running → TimedOut` CAS: resume the caller,
/// account for the abandoned worker, and respawn a replacement if the budget and the
/// shutdown flag allow it.
pub(crate) fn handle_job_timeout(shared: &Arc<AbandoningShared>, job: &Job) {
    job.resume(Err(LifecycleError::Timeout));

    let should_respawn = {
        let mut state = shared.core.lock_state();
        state.metrics.workers.abandoned += 1;
        state.metrics.workers.active = state.metrics.workers.active.saturating_sub(1);
        state.metrics.executing_count =
            state.metrics.executing_count.saturating_sub(1);
        shared.core.publish_active_locked(&state);
        !state.is_shutdown && state.metrics.workers.spawned < shared.max_workers
    };

    if should_respawn {
        match spawn_worker(shared) {
            Ok(()) => {
                tracing::warn!(
                    "job {}: worker abandoned after execution timeout; replacement \
                     spawned",
                    job.ticket
                );
            }
            Err(spawn_error) => {
                tracing::error!(
                    "job {}: worker abandoned and replacement spawn failed: \
                     {spawn_error}",
                    job.ticket
                );
                fail_queue_if_pool_dead(shared);
            }
        }
    } else {
        tracing::warn!(
            "job {}: worker abandoned after execution timeout; no replacement \
             (budget exhausted or shutting down)",
            job.ticket
        );
        fail_queue_if_pool_dead(shared);
    }
}

/// If no live workers remain, marks the pool dead (admission rejects with
/// `Overloaded` from then on) and fails every queued job so no caller is left
/// suspended on a queue nobody will ever drain.
fn fail_queue_if_pool_dead(shared: &AbandoningShared) {
    let died = {
        let mut state = shared.core.lock_state();
        if state.metrics.workers.active == 0 && !state.pool_dead {
            state.pool_dead = true;
            true
        } else {
            false
        }
    };
    if died {
        tracing::error!("abandoning lane has no live workers left; failing queued jobs");
        shared.core.drain_queue_failing_pending();
    }
}

/// The abandon-on-timeout pool. Created by [`Lane::abandoning()`].
///
/// [`Lane::abandoning()`]: crate::Lane::abandoning
#[allow(missing_debug_implementations)]
pub(crate) struct AbandoningLaneRuntime {
    shared: Arc<AbandoningShared>,
}

impl AbandoningLaneRuntime {
    /// Builds the pool and spawns the initial workers.
    ///
    /// # Errors
    ///
    /// Returns [`LaneSpawnError::ThreadSpawn`] if the OS refuses a worker thread. Any
    /// workers spawned before the failure are shut down before returning.
    pub(crate) fn new(options: AbandoningLaneOptions) -> Result<Self, LaneSpawnError> {
        let options = options.normalized();
        let core = Arc::new(PoolCore::new(PoolSettings {
            queue_limit: options.backpressure.queue_limit,
            acceptance_waiters_limit: options.backpressure.acceptance_waiters_limit,
            strategy: options.backpressure.strategy,
            scheduling: options.scheduling,
            // One job per claim: a worker abandoned mid-batch would strand every
            // other job it had already popped.
            batch_size: 1,
            on_transition: options.on_state_transition,
        }));
        let shared = Arc::new(AbandoningShared {
            core,
            execution_timeout: options.execution_timeout,
            max_workers: u64::try_from(options.max_workers).unwrap_or(u64::MAX),
        });

        for _ in 0..options.initial_workers {
            if let Err(spawn_error) = spawn_worker(&shared) {
                shared.core.begin_shutdown();
                return Err(spawn_error);
            }
        }

        tracing::debug!(
            "abandoning lane started with {} workers (max {}, timeout {:?})",
            options.initial_workers,
            options.max_workers,
            options.execution_timeout
        );
        Ok(Self { shared })
    }
}

impl RawLane for AbandoningLaneRuntime {
    fn run_boxed(
        self: Arc<Self>,
        deadline: Option<Deadline>,
        op: BoxedOperation,
    ) -> BoxFuture<'static, Result<HandoffBox, LaneFailure>> {
        let core = Arc::clone(&self.shared.core);
        Box::pin(async move { core.submit(deadline, op).await })
    }

    fn shutdown(self: Arc<Self>) -> BoxFuture<'static, ()> {
        let core = Arc::clone(&self.shared.core);
        Box::pin(async move {
            core.begin_shutdown();
            core.await_workers_idle().await;
            tracing::debug!("abandoning lane shutdown complete");
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            executes_on_dedicated_threads: true,
            execution_semantics: ExecutionSemantics::AbandonOnExecutionTimeout,
        }
    }

    fn metrics(&self) -> LaneMetrics { self.shared.core.snapshot() }
}
