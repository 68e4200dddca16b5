// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words unlinks respawn

//! The shared pool engine: one coarse mutex over queue + waiters + metrics, a
//! work-available condition variable with a sleepers counter, and the admission /
//! promotion / cancellation / shutdown protocols. See [`PoolCore`].
//!
//! Both runtimes (threads and abandoning) drive this engine; they differ only in what
//! their workers do with a claimed job.
//!
//! # Locking Discipline
//!
//! The pool lock is the only coarse lock. It is held for O(1) on the admission path
//! and O(batch) on the worker drain path, and never across an operation's execution or
//! an `.await`. Job-local locks (operation slot, completion slot) are held only for a
//! take. No lock is acquired while another is held.
//!
//! # Wake Economy
//!
//! Workers park on the condition variable only after observing an empty queue under
//! the lock, and `sleepers` is incremented under that same lock. An enqueue that moves
//! the queue from empty to non-empty therefore signals only when `sleepers > 0`: if no
//! worker is parked, every worker is between drains and will re-check the queue before
//! parking, so the enqueue cannot be missed.
//!
//! That single edge-triggered signal is enough because workers relay it: a woken
//! worker that leaves jobs queued while peers are still parked claims only one job
//! and passes the signal on, so a burst of N enqueues fans out across the idle
//! workers instead of serializing on the first one awake. See
//! [`PoolCore::next_batch`] for the two rules.

use super::job::{BoxedOperation, Job, JobOutcome, JobState};
use crate::{AdmissionStrategy, Deadline, LaneError, LaneFailure, LaneMetrics,
            LifecycleError, QueueTransition, Scheduling, TransitionCallback};
use smallvec::SmallVec;
use std::{cell::Cell,
          collections::VecDeque,
          sync::{Arc, Condvar, Mutex, MutexGuard},
          time::{Duration, Instant}};
use tokio::sync::{oneshot, watch};

/// Edge transitions produced by one locked mutation of the queue.
pub(crate) type EdgeSet = SmallVec<[QueueTransition; 4]>;

/// Jobs claimed by a worker in one drain.
pub(crate) type Batch = SmallVec<[Arc<Job>; 16]>;

/// Immutable per-pool configuration, fixed at construction.
#[allow(missing_debug_implementations)]
pub(crate) struct PoolSettings {
    pub(crate) queue_limit: usize,
    pub(crate) acceptance_waiters_limit: usize,
    pub(crate) strategy: AdmissionStrategy,
    pub(crate) scheduling: Scheduling,
    pub(crate) batch_size: usize,
    pub(crate) on_transition: Option<TransitionCallback>,
}

/// A caller suspended because the job queue was full under the wait strategy.
///
/// The waiter owns its (not yet enqueued) job; promotion moves that job into the queue
/// under the pool lock, so a promoted slot is immediately countable in queue depth.
pub(crate) struct AcceptanceWaiter {
    pub(crate) id: u64,
    pub(crate) job: Arc<Job>,
    pub(crate) admit_tx: oneshot::Sender<WaiterResume>,
    pub(crate) waiting_since: Instant,
}

/// How a suspended acceptance waiter is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaiterResume {
    /// A queue slot freed up and the waiter's job is now enqueued.
    Enqueued,
    /// The lane began shutting down before a slot freed up.
    ShutdownInProgress,
}

/// Everything guarded by the pool lock.
pub(crate) struct PoolState {
    pub(crate) queue: VecDeque<Arc<Job>>,
    pub(crate) sleepers: usize,
    pub(crate) is_shutdown: bool,
    /// Set by the abandoning runtime when the last active worker is gone and respawn
    /// is impossible. Admission rejects with `Overloaded` from then on.
    pub(crate) pool_dead: bool,
    pub(crate) next_ticket: u64,
    pub(crate) next_waiter_id: u64,
    pub(crate) waiters: VecDeque<AcceptanceWaiter>,
    pub(crate) metrics: LaneMetrics,
}

/// Outcome of one admission attempt, decided under a single lock acquisition.
pub(crate) enum Admission {
    /// The job is in the queue; await the outcome receiver.
    Enqueued {
        job: Arc<Job>,
        outcome_rx: oneshot::Receiver<JobOutcome>,
    },
    /// The queue was full; the caller is now an acceptance waiter.
    Waiting {
        job: Arc<Job>,
        waiter_id: u64,
        admit_rx: oneshot::Receiver<WaiterResume>,
        outcome_rx: oneshot::Receiver<JobOutcome>,
    },
    /// Rejected before any job was registered.
    Rejected(LaneFailure),
}

/// What a worker should do next.
pub(crate) enum WorkerDirective {
    /// Execute these jobs in order.
    Execute(Batch),
    /// Shutdown observed with an empty queue; exit the loop.
    Exit,
}

/// The shared pool engine. Owned via `Arc` by the runtime, every worker thread, every
/// in-flight submission future, and (on the abandoning runtime) every watchdog.
#[allow(missing_debug_implementations)]
pub(crate) struct PoolCore {
    state: Mutex<PoolState>,
    work_available: Condvar,
    /// Publishes the live worker count; `shutdown()` awaits it reaching zero. This is
    /// the async-side replacement for a shutdown-complete condition variable.
    worker_exit_tx: watch::Sender<usize>,
    pub(crate) settings: PoolSettings,
}

impl PoolCore {
    pub(crate) fn new(settings: PoolSettings) -> Self {
        let (worker_exit_tx, _) = watch::channel(0);
        Self {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                sleepers: 0,
                is_shutdown: false,
                pool_dead: false,
                next_ticket: 0,
                next_waiter_id: 0,
                waiters: VecDeque::new(),
                metrics: LaneMetrics::default(),
            }),
            work_available: Condvar::new(),
            worker_exit_tx,
            settings,
        }
    }

    /// Acquires the pool lock. A poisoned lock is recovered: the pool's state is a
    /// plain data structure whose consistency is re-established by the invariant
    /// checks on every transition, and refusing all further work would turn one
    /// panicking thread into a wedged process.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ── Admission (caller side) ─────────────────────────────────────────────

    /// One admission attempt under a single lock acquisition: enqueue, reject, or
    /// register an acceptance waiter, per the backpressure policy.
    pub(crate) fn admit(&self, op: BoxedOperation) -> Admission {
        let mut edges = EdgeSet::new();
        let mut wake_one = false;

        let admission = {
            let mut state = self.lock_state();
            if state.is_shutdown {
                Admission::Rejected(LifecycleError::ShutdownInProgress)
            } else if state.pool_dead {
                state.metrics.overloaded_total += 1;
                Admission::Rejected(LifecycleError::Failure(LaneError::Overloaded))
            } else if state.queue.len() < self.settings.queue_limit {
                let (outcome_tx, outcome_rx) = oneshot::channel();
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                let job = Arc::new(Job::new(ticket, op, outcome_tx));

                job.mark_enqueued();
                state.metrics.enqueued_total += 1;
                let before = state.queue.len();
                state.queue.push_back(Arc::clone(&job));
                push_edges(before, state.queue.len(), self.settings.queue_limit, &mut edges);
                wake_one = before == 0 && state.sleepers > 0;

                Admission::Enqueued { job, outcome_rx }
            } else {
                match self.settings.strategy {
                    AdmissionStrategy::FailFast => {
                        state.metrics.fail_fast_total += 1;
                        Admission::Rejected(LifecycleError::Failure(LaneError::QueueFull))
                    }
                    AdmissionStrategy::Wait => {
                        if state.waiters.len() >= self.settings.acceptance_waiters_limit {
                            state.metrics.overloaded_total += 1;
                            Admission::Rejected(LifecycleError::Failure(
                                LaneError::Overloaded,
                            ))
                        } else {
                            let (outcome_tx, outcome_rx) = oneshot::channel();
                            let (admit_tx, admit_rx) = oneshot::channel();
                            let ticket = state.next_ticket;
                            state.next_ticket += 1;
                            let waiter_id = state.next_waiter_id;
                            state.next_waiter_id += 1;
                            let job = Arc::new(Job::new(ticket, op, outcome_tx));
                            state.waiters.push_back(AcceptanceWaiter {
                                id: waiter_id,
                                job: Arc::clone(&job),
                                admit_tx,
                                waiting_since: Instant::now(),
                            });
                            Admission::Waiting {
                                job,
                                waiter_id,
                                admit_rx,
                                outcome_rx,
                            }
                        }
                    }
                }
            }
        };

        self.emit_edges(edges);
        if wake_one {
            self.work_available.notify_one();
        }
        admission
    }

    /// Runs one submission end to end: admit, wait for acceptance if needed (bounded
    /// by `deadline`), then wait for the worker-side outcome. Dropping the returned
    /// future cancels the submission via [`CancelGuard`].
    pub(crate) async fn submit(
        self: Arc<Self>,
        deadline: Option<Deadline>,
        op: BoxedOperation,
    ) -> JobOutcome {
        match self.admit(op) {
            Admission::Rejected(error) => Err(error),

            Admission::Enqueued { job, outcome_rx } => {
                let guard = CancelGuard::new(Arc::clone(&self), job, None);
                let outcome = await_outcome(outcome_rx).await;
                guard.disarm();
                outcome
            }

            Admission::Waiting {
                job,
                waiter_id,
                mut admit_rx,
                outcome_rx,
            } => {
                let guard =
                    CancelGuard::new(Arc::clone(&self), Arc::clone(&job), Some(waiter_id));

                let resume = match deadline {
                    Some(deadline) => {
                        match tokio::time::timeout_at(deadline.instant(), &mut admit_rx)
                            .await
                        {
                            Ok(resume) => resume,
                            Err(_elapsed) => {
                                // The deadline races promotion and shutdown; the
                                // unlink under the lock disambiguates. If the waiter
                                // is gone, one of them resumed it just in time, and
                                // the real resume value is (or is about to be) in the
                                // channel.
                                if self.unlink_waiter(waiter_id) {
                                    guard.disarm();
                                    return Err(LifecycleError::Timeout);
                                }
                                admit_rx.await
                            }
                        }
                    }
                    None => admit_rx.await,
                };

                match resume {
                    Ok(WaiterResume::Enqueued) => {
                        let outcome = await_outcome(outcome_rx).await;
                        guard.disarm();
                        outcome
                    }
                    Ok(WaiterResume::ShutdownInProgress) => {
                        guard.disarm();
                        Err(LifecycleError::ShutdownInProgress)
                    }
                    Err(_sender_dropped) => {
                        guard.disarm();
                        Err(LifecycleError::Failure(LaneError::InternalInvariantViolation))
                    }
                }
            }
        }
    }

    /// Removes a waiter from the waiter queue. Returns `false` if it was already
    /// promoted or drained, which makes the callers' races idempotent.
    pub(crate) fn unlink_waiter(&self, waiter_id: u64) -> bool {
        let mut state = self.lock_state();
        match state.waiters.iter().position(|w| w.id == waiter_id) {
            Some(index) => {
                drop(state.waiters.remove(index));
                true
            }
            None => false,
        }
    }

    /// The cancellation hook shared by enqueued jobs and acceptance waiters. Unlinks
    /// the waiter (idempotent with promotion), then attempts the cancellation CAS from
    /// either side of the start transition. The winning path is the one that resumes.
    pub(crate) fn cancel_submission(&self, job: &Job, waiter_id: Option<u64>) {
        {
            let mut state = self.lock_state();
            if let Some(id) = waiter_id {
                if let Some(index) = state.waiters.iter().position(|w| w.id == id) {
                    drop(state.waiters.remove(index));
                }
            }
            if job.try_transition(JobState::Pending, JobState::Cancelled) {
                // The job may still sit in the queue; the worker's start CAS fails
                // and it skips the job.
                state.metrics.cancelled_total += 1;
            } else if job.try_transition(JobState::Running, JobState::Cancelled) {
                state.metrics.cancelled_total += 1;
                state.metrics.executing_count =
                    state.metrics.executing_count.saturating_sub(1);
            } else {
                // Terminal already: completion won the race, cancellation is a no-op.
                return;
            }
        }
        tracing::debug!("job {} cancelled by caller", job.ticket);
        job.resume(Err(LifecycleError::Cancelled));
    }

    // ── Worker side ─────────────────────────────────────────────────────────

    /// Parks until work or shutdown, then claims jobs for this worker. Each pop
    /// promotes the head acceptance waiter under the same lock, so promotion is FIFO
    /// and the freed slot is refilled atomically with the dequeue.
    ///
    /// # Burst Distribution
    ///
    /// The enqueue side signals only on the empty-to-non-empty edge, so a burst of N
    /// jobs delivers exactly one wakeup. Two rules here turn that one wakeup into N
    /// busy workers instead of one worker with a batch of N:
    ///
    /// - **Claim bound**: while peers are parked, a worker claims a single job;
    ///   full-batch claims happen only when nobody is waiting for work (parked
    ///   workers would otherwise stay asleep while one worker serializes the burst).
    /// - **Wake chaining**: a worker that leaves with work still queued and peers
    ///   still parked passes the signal on before executing, so the single enqueue
    ///   wakeup cascades through the parked workers until the queue or the sleepers
    ///   run out.
    pub(crate) fn next_batch(&self) -> WorkerDirective {
        let mut edges = EdgeSet::new();
        let mut batch = Batch::new();
        let wake_another;

        {
            let mut state = self.lock_state();
            loop {
                if state.is_shutdown && state.queue.is_empty() {
                    return WorkerDirective::Exit;
                }
                if !state.queue.is_empty() {
                    break;
                }
                state.sleepers += 1;
                state = match self.work_available.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                state.sleepers -= 1;
            }

            let claim_limit = if state.sleepers > 0 {
                1
            } else {
                self.settings.batch_size
            };
            while batch.len() < claim_limit {
                let before = state.queue.len();
                let popped = match self.settings.scheduling {
                    Scheduling::Fifo => state.queue.pop_front(),
                    Scheduling::Lifo => state.queue.pop_back(),
                };
                let Some(job) = popped else { break };
                pop_edges(before, state.queue.len(), self.settings.queue_limit, &mut edges);
                batch.push(job);
                self.promote_one_waiter_locked(&mut state, &mut edges);
            }

            wake_another = !state.queue.is_empty() && state.sleepers > 0;
        }

        self.emit_edges(edges);
        if wake_another {
            self.work_available.notify_one();
        }
        WorkerDirective::Execute(batch)
    }

    /// Moves the head acceptance waiter's job into the queue, if there is a waiter and
    /// a free slot. Must run under the pool lock.
    fn promote_one_waiter_locked(&self, state: &mut PoolState, edges: &mut EdgeSet) {
        if state.queue.len() >= self.settings.queue_limit {
            return;
        }
        let Some(waiter) = state.waiters.pop_front() else {
            return;
        };
        waiter.job.mark_enqueued();
        state.metrics.enqueued_total += 1;
        state.metrics.acceptance_promoted_total += 1;
        state
            .metrics
            .acceptance_wait
            .record(waiter.waiting_since.elapsed());
        let before = state.queue.len();
        state.queue.push_back(Arc::clone(&waiter.job));
        push_edges(before, state.queue.len(), self.settings.queue_limit, edges);
        drop(waiter.admit_tx.send(WaiterResume::Enqueued));
    }

    /// Claims the start transition for a job and records start metrics. Returns
    /// `false` when the job was cancelled (or failed) before a worker reached it, in
    /// which case the worker skips it.
    ///
    /// The CAS runs under the pool lock, together with the `executing_count`
    /// increment, so it serializes with [`cancel_submission`]'s `Running` CAS and
    /// decrement: cancellation can only observe `Running` after the increment has
    /// landed, and a cancel that wins `Pending → Cancelled` first makes this CAS fail
    /// before any increment.
    ///
    /// [`cancel_submission`]: Self::cancel_submission
    pub(crate) fn begin_job(&self, job: &Job) -> bool {
        let mut state = self.lock_state();
        if !job.try_transition(JobState::Pending, JobState::Running) {
            return false;
        }
        state.metrics.started_total += 1;
        state.metrics.executing_count += 1;
        if let Some(waited) = job.time_in_queue() {
            state.metrics.enqueue_to_start.record(waited);
        }
        true
    }

    /// Records a completed delivery (this worker won the terminal CAS).
    pub(crate) fn record_delivery(&self, execution: Duration) {
        let mut state = self.lock_state();
        state.metrics.completed_total += 1;
        state.metrics.executing_count = state.metrics.executing_count.saturating_sub(1);
        state.metrics.execution.record(execution);
    }

    /// Records an execution whose result was discarded because another path won the
    /// terminal CAS. The winner already moved `executing_count`.
    pub(crate) fn record_lost_execution(&self, execution: Duration) {
        let mut state = self.lock_state();
        state.metrics.execution.record(execution);
    }

    /// Records a panicked execution that this worker moved to `Failed`.
    pub(crate) fn record_failed_execution(&self) {
        let mut state = self.lock_state();
        state.metrics.executing_count = state.metrics.executing_count.saturating_sub(1);
    }

    // ── Worker accounting ───────────────────────────────────────────────────

    /// Registers a worker before its thread is spawned. Returns the worker's
    /// generation (1-based, monotonic across respawns) for thread naming.
    pub(crate) fn register_worker(&self) -> u64 {
        let mut state = self.lock_state();
        state.metrics.workers.spawned += 1;
        state.metrics.workers.active += 1;
        let generation = state.metrics.workers.spawned;
        self.publish_active_locked(&state);
        generation
    }

    /// Rolls back [`register_worker`] after a failed thread spawn.
    ///
    /// [`register_worker`]: Self::register_worker
    pub(crate) fn rollback_worker_registration(&self) {
        let mut state = self.lock_state();
        state.metrics.workers.spawned = state.metrics.workers.spawned.saturating_sub(1);
        state.metrics.workers.active = state.metrics.workers.active.saturating_sub(1);
        self.publish_active_locked(&state);
    }

    fn unregister_worker(&self) {
        let mut state = self.lock_state();
        state.metrics.workers.active = state.metrics.workers.active.saturating_sub(1);
        self.publish_active_locked(&state);
    }

    /// Publishes the live worker count to shutdown awaiters. Must run under the pool
    /// lock so the published value cannot go backwards.
    pub(crate) fn publish_active_locked(&self, state: &PoolState) {
        self.worker_exit_tx.send_replace(state.metrics.workers.active);
    }

    // ── Shutdown ────────────────────────────────────────────────────────────

    /// Flips the shutdown flag, wakes every parked worker, and drains all acceptance
    /// waiters with `ShutdownInProgress`. Idempotent. Accepted jobs stay in the queue
    /// and run to completion.
    pub(crate) fn begin_shutdown(&self) {
        let drained: Vec<AcceptanceWaiter> = {
            let mut state = self.lock_state();
            state.is_shutdown = true;
            state.waiters.drain(..).collect()
        };
        self.work_available.notify_all();
        for waiter in drained {
            drop(waiter.admit_tx.send(WaiterResume::ShutdownInProgress));
        }
    }

    /// Suspends until every registered worker has exited. Abandoned workers were
    /// already removed from the live count when their watchdog walked away from them.
    pub(crate) async fn await_workers_idle(&self) {
        let mut exit_rx = self.worker_exit_tx.subscribe();
        drop(exit_rx.wait_for(|active| *active == 0).await);
    }

    /// Fails every job still pending in the queue. Used by the abandoning runtime
    /// when the pool dies with queued work; resuming with an error preserves
    /// exactly-once resumption instead of leaving callers suspended forever.
    pub(crate) fn drain_queue_failing_pending(&self) {
        let mut edges = EdgeSet::new();
        let drained: Vec<Arc<Job>> = {
            let mut state = self.lock_state();
            let mut drained = Vec::with_capacity(state.queue.len());
            while let Some(job) = state.queue.pop_front() {
                pop_edges(
                    state.queue.len() + 1,
                    state.queue.len(),
                    self.settings.queue_limit,
                    &mut edges,
                );
                drained.push(job);
            }
            drained
        };
        self.emit_edges(edges);
        for job in drained {
            if job.try_transition(JobState::Pending, JobState::Failed) {
                job.resume(Err(LifecycleError::Failure(LaneError::Overloaded)));
            }
        }
    }

    // ── Observability ───────────────────────────────────────────────────────

    /// O(1) snapshot of counters, gauges, and latency aggregates.
    pub(crate) fn snapshot(&self) -> LaneMetrics {
        let state = self.lock_state();
        let mut metrics = state.metrics;
        metrics.queue_depth = state.queue.len();
        metrics.acceptance_waiters_depth = state.waiters.len();
        metrics
    }

    fn emit_edges(&self, edges: EdgeSet) {
        if edges.is_empty() {
            return;
        }
        if let Some(callback) = &self.settings.on_transition {
            for edge in edges {
                callback(edge);
            }
        }
    }
}

/// Edges produced by a push that took the depth from `before` to `after`.
fn push_edges(before: usize, after: usize, limit: usize, edges: &mut EdgeSet) {
    if before == 0 && after > 0 {
        edges.push(QueueTransition::BecameNonEmpty);
    }
    if before < limit && after >= limit {
        edges.push(QueueTransition::BecameSaturated);
    }
}

/// Edges produced by a pop that took the depth from `before` to `after`.
fn pop_edges(before: usize, after: usize, limit: usize, edges: &mut EdgeSet) {
    if before > 0 && after == 0 {
        edges.push(QueueTransition::BecameEmpty);
    }
    if before >= limit && after < limit {
        edges.push(QueueTransition::BecameNotSaturated);
    }
}

async fn await_outcome(outcome_rx: oneshot::Receiver<JobOutcome>) -> JobOutcome {
    match outcome_rx.await {
        Ok(outcome) => outcome,
        // The job was dropped without a terminal resumption. Unreachable unless the
        // pool's CAS discipline is broken.
        Err(_sender_dropped) => {
            Err(LifecycleError::Failure(LaneError::InternalInvariantViolation))
        }
    }
}

/// Drop-based cancellation hook for one in-flight submission.
///
/// Async Rust cancels by dropping the future; this guard turns that drop into the
/// cancellation protocol (waiter unlink + cancellation CAS). Disarmed once an outcome
/// has been delivered, at which point the job is terminal and the hook would be a
/// no-op anyway.
struct CancelGuard {
    core: Arc<PoolCore>,
    job: Arc<Job>,
    waiter_id: Option<u64>,
    armed: Cell<bool>,
}

impl CancelGuard {
    fn new(core: Arc<PoolCore>, job: Arc<Job>, waiter_id: Option<u64>) -> Self {
        Self {
            core,
            job,
            waiter_id,
            armed: Cell::new(true),
        }
    }

    fn disarm(&self) { self.armed.set(false); }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed.get() {
            self.core.cancel_submission(&self.job, self.waiter_id);
        }
    }
}

/// RAII bookkeeping for a worker thread's exit: decrements the live count no matter
/// how the loop ends. A worker abandoned by its watchdog marks itself so the count is
/// not decremented twice (the watchdog already removed it).
#[allow(missing_debug_implementations)]
pub(crate) struct WorkerExitGuard {
    core: Arc<PoolCore>,
    abandoned: Cell<bool>,
}

impl WorkerExitGuard {
    pub(crate) fn new(core: Arc<PoolCore>) -> Self {
        Self {
            core,
            abandoned: Cell::new(false),
        }
    }

    /// Marks this worker as abandoned; its exit no longer affects the live count.
    pub(crate) fn mark_abandoned(&self) { self.abandoned.set(true); }
}

impl Drop for WorkerExitGuard {
    fn drop(&mut self) {
        if !self.abandoned.get() {
            self.core.unregister_worker();
        }
    }
}
