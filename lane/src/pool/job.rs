// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! One accepted operation: its closure, atomic lifecycle state, completion slot, and
//! timing stamps. See [`Job`].

use crate::{HandoffBox, LaneFailure};
use std::{sync::{Mutex, OnceLock,
                 atomic::{AtomicU8, Ordering}},
          time::{Duration, Instant}};
use tokio::sync::oneshot;

/// The boxed form of a submitted operation: produces an erased result box on a worker
/// thread.
pub(crate) type BoxedOperation = Box<dyn FnOnce() -> HandoffBox + Send + 'static>;

/// What the completion slot delivers to the awaiting caller.
pub(crate) type JobOutcome = Result<HandoffBox, LaneFailure>;

/// Lifecycle state of a job, stored as a single atomic tag.
///
/// ```text
///           try_start
/// Pending ────────────► Running ──┬── Completed   (worker delivered the result)
///    │                            ├── TimedOut    (watchdog abandoned the worker)
///    │                            ├── Cancelled   (caller dropped mid-flight)
///    │                            └── Failed      (operation panicked)
///    ├── Cancelled   (caller dropped before start; worker skips the job)
///    └── Failed      (pool died before the job could start)
/// ```
///
/// Every transition is a compare-and-swap; exactly one CAS into a terminal state wins,
/// and only the winner resumes the caller. Losers observe the terminal state and
/// release whatever they produced without resuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum JobState {
    Pending = 0,
    Running = 1,
    Completed = 2,
    TimedOut = 3,
    Cancelled = 4,
    Failed = 5,
}

impl JobState {
    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::TimedOut,
            4 => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

/// One submitted operation, owned by the runtime from enqueue until its terminal CAS.
///
/// The completion slot holds the caller's continuation (a [`oneshot::Sender`]); taking
/// it out of the slot is the only way to resume, so resumption is structurally
/// exactly-once. The slot is written through a back-pointer held by whoever wins the
/// terminal CAS; there is no ticket-to-continuation lookup.
#[allow(missing_debug_implementations)]
pub(crate) struct Job {
    /// Atomic lifecycle tag. See [`JobState`].
    state: AtomicU8,

    /// The operation, taken exactly once by the worker that wins `try_start`.
    operation: Mutex<Option<BoxedOperation>>,

    /// The caller's continuation, taken exactly once by the terminal-CAS winner.
    completion: Mutex<Option<oneshot::Sender<JobOutcome>>>,

    /// Identity for debug correlation (thread names, logs).
    pub(crate) ticket: u64,

    /// Stamped when the job actually enters the job queue (directly or by waiter
    /// promotion), which may be later than construction.
    enqueued_at: OnceLock<Instant>,
}

impl Job {
    pub(crate) fn new(
        ticket: u64,
        operation: BoxedOperation,
        completion: oneshot::Sender<JobOutcome>,
    ) -> Self {
        Self {
            state: AtomicU8::new(JobState::Pending as u8),
            operation: Mutex::new(Some(operation)),
            completion: Mutex::new(Some(completion)),
            ticket,
            enqueued_at: OnceLock::new(),
        }
    }

    /// Attempts the `from → to` transition. Returns `true` iff this call performed it.
    pub(crate) fn try_transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> JobState {
        JobState::from_tag(self.state.load(Ordering::Acquire))
    }

    /// Stamps the moment the job entered the job queue. Idempotent; the first stamp
    /// wins (a promotion cannot re-stamp).
    pub(crate) fn mark_enqueued(&self) { drop(self.enqueued_at.set(Instant::now())); }

    /// Time from queue entry to now. [`None`] if the job was never enqueued.
    pub(crate) fn time_in_queue(&self) -> Option<Duration> {
        self.enqueued_at.get().map(Instant::elapsed)
    }

    /// Takes the operation out of the job. Only the `try_start` winner calls this.
    pub(crate) fn take_operation(&self) -> Option<BoxedOperation> {
        match self.operation.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Resumes the caller's continuation with `outcome`.
    ///
    /// Must only be called by the terminal-CAS winner. A second call finds the slot
    /// empty and does nothing (the caller cannot be resumed twice); a send to a caller
    /// that has since dropped its future is equally harmless.
    pub(crate) fn resume(&self, outcome: JobOutcome) {
        let sender = match self.completion.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => drop(sender.send(outcome)),
            None => {
                tracing::error!(
                    "job {}: completion slot already consumed; dropping outcome",
                    self.ticket
                );
            }
        }
    }
}

/// Best-effort extraction of a panic payload's message for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_job() -> (Arc<Job>, oneshot::Receiver<JobOutcome>) {
        let (tx, rx) = oneshot::channel();
        let job = Arc::new(Job::new(1, Box::new(|| HandoffBox::new(0_u8)), tx));
        (job, rx)
    }

    #[test]
    fn exactly_one_terminal_cas_wins() {
        let (job, _rx) = test_job();
        assert!(job.try_transition(JobState::Pending, JobState::Running));

        let mut wins = 0;
        for terminal in [JobState::Completed, JobState::Cancelled, JobState::TimedOut] {
            if job.try_transition(JobState::Running, terminal) {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn racing_threads_produce_one_winner() {
        let (job, _rx) = test_job();
        assert!(job.try_transition(JobState::Pending, JobState::Running));

        let winners: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = [JobState::Completed, JobState::Cancelled]
                .into_iter()
                .map(|terminal| {
                    let job = Arc::clone(&job);
                    scope.spawn(move || {
                        job.try_transition(JobState::Running, terminal)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(winners.iter().filter(|won| **won).count(), 1);
    }

    #[test]
    fn resume_is_exactly_once() {
        let (job, mut rx) = test_job();
        job.resume(Err(crate::LifecycleError::Cancelled));
        job.resume(Err(crate::LifecycleError::ShutdownInProgress));

        let delivered = rx.try_recv().unwrap();
        assert!(matches!(delivered, Err(crate::LifecycleError::Cancelled)));
    }

    #[test]
    fn operation_is_taken_once() {
        let (job, _rx) = test_job();
        assert!(job.take_operation().is_some());
        assert!(job.take_operation().is_none());
    }

    #[test]
    fn enqueue_stamp_is_first_write_wins() {
        let (job, _rx) = test_job();
        assert!(job.time_in_queue().is_none());
        job.mark_enqueued();
        std::thread::sleep(Duration::from_millis(5));
        job.mark_enqueued();
        assert!(job.time_in_queue().unwrap() >= Duration::from_millis(5));
    }
}
