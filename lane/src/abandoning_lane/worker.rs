// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The worker loop for the abandoning runtime: like the threads worker, plus a
//! watchdog per started job and self-retirement after being abandoned.

use super::{runtime::AbandoningShared, watchdog};
use crate::{LaneError, LifecycleError,
            pool::{core::{WorkerDirective, WorkerExitGuard},
                   job::{Job, JobState, panic_message}}};
use std::{panic::{AssertUnwindSafe, catch_unwind},
          sync::Arc,
          time::Instant};

/// Whether the worker keeps serving the pool after a job, or was abandoned by the
/// job's watchdog and must exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerFate {
    Serving,
    Abandoned,
}

/// Runs on a dedicated OS thread until shutdown, or until a watchdog abandons it.
pub(crate) fn run_worker_loop(shared: Arc<AbandoningShared>, generation: u64) {
    let exit_guard = WorkerExitGuard::new(Arc::clone(&shared.core));
    tracing::debug!("abandoning lane worker g{generation} started");
    'serve: loop {
        match shared.core.next_batch() {
            WorkerDirective::Exit => break,
            WorkerDirective::Execute(batch) => {
                for job in batch {
                    if execute_job(&shared, &job) == WorkerFate::Abandoned {
                        // The watchdog already removed this worker from the live
                        // count and handled respawn. Exit without touching it.
                        exit_guard.mark_abandoned();
                        tracing::debug!(
                            "abandoning lane worker g{generation} retiring after \
                             being abandoned"
                        );
                        break 'serve;
                    }
                }
            }
        }
    }
    tracing::debug!("abandoning lane worker g{generation} exiting");
}

/// Executes one claimed job under watchdog protection.
fn execute_job(shared: &Arc<AbandoningShared>, job: &Arc<Job>) -> WorkerFate {
    let core = &shared.core;
    if !core.begin_job(job) {
        return WorkerFate::Serving;
    }

    let Some(op) = job.take_operation() else {
        if job.try_transition(JobState::Running, JobState::Failed) {
            core.record_failed_execution();
            job.resume(Err(LifecycleError::Failure(
                LaneError::InternalInvariantViolation,
            )));
        }
        return WorkerFate::Serving;
    };

    let gate = match watchdog::spawn_watchdog(Arc::clone(shared), Arc::clone(job)) {
        Ok(gate) => Some(gate),
        Err(io_error) => {
            tracing::warn!(
                "job {}: watchdog spawn failed ({io_error}); running without an \
                 execution timeout",
                job.ticket
            );
            None
        }
    };

    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(op));
    let execution = started.elapsed();
    if let Some(gate) = &gate {
        gate.signal_done();
    }

    match outcome {
        Ok(result_box) => {
            if job.try_transition(JobState::Running, JobState::Completed) {
                core.record_delivery(execution);
                job.resume(Ok(result_box));
                WorkerFate::Serving
            } else {
                core.record_lost_execution(execution);
                drop(result_box);
                fate_after_lost_cas(job)
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
                WorkerFate::Serving
            } else {
                core.record_lost_execution(execution);
                fate_after_lost_cas(job)
            }
        }
    }
}

/// After losing the terminal CAS: a timed-out job means this worker was abandoned; a
/// cancelled job means the caller left but the worker keeps serving.
fn fate_after_lost_cas(job: &Job) -> WorkerFate {
    if job.state() == JobState::TimedOut {
        WorkerFate::Abandoned
    } else {
        WorkerFate::Serving
    }
}
