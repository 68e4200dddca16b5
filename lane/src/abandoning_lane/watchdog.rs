// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Per-job watchdog threads: a timed wait racing the worker's completion signal.

use super::runtime::{AbandoningShared, handle_job_timeout};
use crate::pool::job::{Job, JobState};
use std::sync::{Arc, Condvar, Mutex};

/// The rendezvous between one worker and the watchdog of its current job.
///
/// The worker signals through this gate when the operation returns; the watchdog
/// performs a timed wait on it. Whichever side arrives first, the job's terminal CAS
/// decides who resumes the caller, so the gate itself needs no winner logic.
pub(crate) struct WatchdogGate {
    finished: Mutex<bool>,
    worker_finished: Condvar,
}

impl WatchdogGate {
    fn new() -> Self {
        Self {
            finished: Mutex::new(false),
            worker_finished: Condvar::new(),
        }
    }

    /// Called by the worker the moment its operation returns (or panics), before it
    /// attempts the completion CAS, so the watchdog never outlives the operation by
    /// more than a wakeup.
    pub(crate) fn signal_done(&self) {
        let mut finished = match self.finished.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *finished = true;
        self.worker_finished.notify_one();
    }
}

/// Spawns the watchdog thread for one started job.
///
/// # Errors
///
/// Returns the spawn error; the caller runs the job without timeout protection in
/// that case.
pub(crate) fn spawn_watchdog(
    shared: Arc<AbandoningShared>,
    job: Arc<Job>,
) -> std::io::Result<Arc<WatchdogGate>> {
    let gate = Arc::new(WatchdogGate::new());
    let gate_for_thread = Arc::clone(&gate);
    std::thread::Builder::new()
        .name(format!("lane-watchdog-{}", job.ticket))
        .spawn(move || watch_job(&shared, &job, &gate_for_thread))?;
    Ok(gate)
}

/// The watchdog body: wait up to `execution_timeout` for the worker's signal; on
/// expiry, race the worker for the terminal CAS.
fn watch_job(shared: &Arc<AbandoningShared>, job: &Arc<Job>, gate: &WatchdogGate) {
    let guard = match gate.finished.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let wait = gate.worker_finished.wait_timeout_while(
        guard,
        shared.execution_timeout,
        |finished| !*finished,
    );
    let (finished, _timeout_result) = match wait {
        Ok(pair) => pair,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *finished {
        // Worker beat the timeout; the completion CAS is its to take.
        return;
    }
    drop(finished);

    if job.try_transition(JobState::Running, JobState::TimedOut) {
        handle_job_timeout(shared, job);
    }
    // Losing the CAS means the worker (or a cancellation) got there between the
    // timeout and this attempt; no abandonment happened.
}
