// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The worker loop for the threads runtime: park, drain a batch, execute, resolve via
//! terminal CAS.

use crate::{LaneError, LifecycleError,
            pool::{core::{PoolCore, WorkerDirective, WorkerExitGuard},
                   job::{Job, JobState, panic_message}}};
use std::{panic::{AssertUnwindSafe, catch_unwind},
          sync::Arc,
          time::Instant};

/// Runs on a dedicated OS thread until shutdown is observed with an empty queue.
pub(crate) fn run_worker_loop(core: Arc<PoolCore>, generation: u64) {
    let _exit_guard = WorkerExitGuard::new(Arc::clone(&core));
    tracing::debug!("lane worker g{generation} started");
    loop {
        match core.next_batch() {
            WorkerDirective::Exit => break,
            WorkerDirective::Execute(batch) => {
                for job in batch {
                    execute_job(&core, &job);
                }
            }
        }
    }
    tracing::debug!("lane worker g{generation} exiting");
    // _exit_guard dropped here, removing this worker from the live count.
}

/// Executes one claimed job. The operation may block arbitrarily; no lock is held
/// while it runs.
fn execute_job(core: &PoolCore, job: &Arc<Job>) {
    if !core.begin_job(job) {
        // Cancelled (or failed) before a worker reached it. The winner already
        // resumed the caller; there is nothing to run.
        return;
    }

    let Some(op) = job.take_operation() else {
        if job.try_transition(JobState::Running, JobState::Failed) {
            core.record_failed_execution();
            job.resume(Err(LifecycleError::Failure(
                LaneError::InternalInvariantViolation,
            )));
        }
        return;
    };

    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(op));
    let execution = started.elapsed();

    match outcome {
        Ok(result_box) => {
            if job.try_transition(JobState::Running, JobState::Completed) {
                core.record_delivery(execution);
                job.resume(Ok(result_box));
            } else {
                // Cancelled after start: the caller is gone, the cancellation path
                // already resumed. Destroy the box this worker produced.
                core.record_lost_execution(execution);
                drop(result_box);
            }
        }
        Err(payload) => {
            tracing::error!(
                "job {} panicked: {}",
                job.ticket,
                panic_message(payload.as_ref())
            );
            if job.try_transition(JobState::Running, JobState::Failed) {
                core.record_failed_execution();
                job.resume(Err(LifecycleError::Failure(
                    LaneError::InternalInvariantViolation,
                )));
            } else {
                core.record_lost_execution(execution);
            }
        }
    }
}
