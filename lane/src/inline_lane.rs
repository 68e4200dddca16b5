// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The degenerate lane that runs operations synchronously on the caller. For tests.

use crate::{Capabilities, Deadline, ExecutionSemantics, HandoffBox, LaneFailure,
            LaneMetrics, LifecycleError,
            lane::RawLane,
            pool::job::BoxedOperation};
use futures_util::future::BoxFuture;
use std::{sync::{Arc, Mutex},
          time::Instant};

/// Runs every operation inline on the caller's task: no queue, no workers, no
/// suspension. The deadline is checked exactly once, before invoking the operation;
/// past that point the operation blocks the caller until it returns.
///
/// Truthfully declares `executes_on_dedicated_threads: false`. An operation panic
/// propagates straight to the caller, since the caller's own stack is running it.
#[allow(missing_debug_implementations)]
pub(crate) struct InlineLane {
    metrics: Mutex<LaneMetrics>,
}

impl InlineLane {
    pub(crate) fn new() -> Self {
        Self {
            metrics: Mutex::new(LaneMetrics::default()),
        }
    }
}

impl RawLane for InlineLane {
    fn run_boxed(
        self: Arc<Self>,
        deadline: Option<Deadline>,
        op: BoxedOperation,
    ) -> BoxFuture<'static, Result<HandoffBox, LaneFailure>> {
        Box::pin(async move {
            if deadline.is_some_and(|deadline| deadline.is_expired()) {
                return Err(LifecycleError::Timeout);
            }

            let started = Instant::now();
            let result_box = op();
            let execution = started.elapsed();

            let mut metrics = match self.metrics.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            metrics.enqueued_total += 1;
            metrics.started_total += 1;
            metrics.completed_total += 1;
            metrics.execution.record(execution);

            Ok(result_box)
        })
    }

    fn shutdown(self: Arc<Self>) -> BoxFuture<'static, ()> {
        // Nothing to stop; idempotent by construction.
        Box::pin(async {})
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            executes_on_dedicated_threads: false,
            execution_semantics: ExecutionSemantics::Guaranteed,
        }
    }

    fn metrics(&self) -> LaneMetrics {
        match self.metrics.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
