// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Runtime factory and lane-surface glue for the threads runtime.

use super::{ThreadsLaneOptions, worker};
use crate::{Capabilities, Deadline, ExecutionSemantics, HandoffBox, LaneFailure,
            LaneMetrics, LaneSpawnError,
            lane::RawLane,
            pool::{core::{PoolCore, PoolSettings},
                   job::BoxedOperation}};
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// The default dedicated-thread pool. Created by [`Lane::threads()`].
///
/// [`Lane::threads()`]: crate::Lane::threads
#[allow(missing_debug_implementations)]
pub(crate) struct ThreadsLaneRuntime {
    core: Arc<PoolCore>,
}

impl ThreadsLaneRuntime {
    /// Builds the pool and spawns every worker thread up front.
    ///
    /// # Errors
    ///
    /// Returns [`LaneSpawnError::ThreadSpawn`] if the OS refuses a worker thread. Any
    /// workers spawned before the failure are shut down before returning.
    pub(crate) fn new(options: ThreadsLaneOptions) -> Result<Self, LaneSpawnError> {
        let options = options.normalized();
        let core = Arc::new(PoolCore::new(PoolSettings {
            queue_limit: options.backpressure.queue_limit,
            acceptance_waiters_limit: options.backpressure.acceptance_waiters_limit,
            strategy: options.backpressure.strategy,
            scheduling: options.scheduling,
            batch_size: options.batch_size,
            on_transition: options.on_state_transition,
        }));

        for _ in 0..options.workers {
            let generation = core.register_worker();
            let worker_core = Arc::clone(&core);
            let spawned = std::thread::Builder::new()
                .name(format!("lane-worker-g{generation}"))
                .spawn(move || worker::run_worker_loop(worker_core, generation));
            if let Err(io_error) = spawned {
                core.rollback_worker_registration();
                core.begin_shutdown();
                return Err(LaneSpawnError::ThreadSpawn(io_error));
            }
        }

        tracing::debug!("threads lane started with {} workers", options.workers);
        Ok(Self { core })
    }
}

impl RawLane for ThreadsLaneRuntime {
    fn run_boxed(
        self: Arc<Self>,
        deadline: Option<Deadline>,
        op: BoxedOperation,
    ) -> BoxFuture<'static, Result<HandoffBox, LaneFailure>> {
        let core = Arc::clone(&self.core);
        Box::pin(async move { core.submit(deadline, op).await })
    }

    fn shutdown(self: Arc<Self>) -> BoxFuture<'static, ()> {
        let core = Arc::clone(&self.core);
        Box::pin(async move {
            core.begin_shutdown();
            core.await_workers_idle().await;
            tracing::debug!("threads lane shutdown complete");
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            executes_on_dedicated_threads: true,
            execution_semantics: ExecutionSemantics::Guaranteed,
        }
    }

    fn metrics(&self) -> LaneMetrics { self.core.snapshot() }
}
