// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words respawn respawns respawning

//! The fault-tolerant lane runtime: per-job watchdogs, worker abandonment, and
//! respawn. See [`AbandoningLaneOptions`] and [`Lane::abandoning()`].
//!
//! Once a job starts, a watchdog thread sleeps alongside it:
//!
//! ```text
//! worker: start job ──► spawn watchdog ──► operation() ──► signal done ──► CAS
//!                              │                                           ▲
//!                              │ wait_timeout(execution_timeout)           │
//!                              ▼                                           │
//!                       timed out first? ──► CAS Running → TimedOut ───────┘
//!                                            resume caller with Timeout,
//!                                            abandon worker, respawn
//! ```
//!
//! Abandonment means the blocked worker thread is treated as leaked: nobody interrupts
//! the syscall it is stuck in, nobody joins it, and a replacement is spawned while
//! `spawned < max_workers`. This is why the runtime declares
//! [`ExecutionSemantics::AbandonOnExecutionTimeout`] and why it is unsuitable for
//! sustained production use under unbounded-latency operations: every timeout
//! permanently consumes a thread until the process exits.
//!
//! [`ExecutionSemantics::AbandonOnExecutionTimeout`]: crate::ExecutionSemantics::AbandonOnExecutionTimeout
//! [`Lane::abandoning()`]: crate::Lane::abandoning

mod runtime;
mod watchdog;
mod worker;

pub(crate) use runtime::*;

use crate::{BackpressurePolicy, Scheduling, TransitionCallback,
            threads_lane::DEFAULT_BATCH_SIZE};
use std::time::Duration;

/// Configuration for [`Lane::abandoning()`].
///
/// [`Lane::abandoning()`]: crate::Lane::abandoning
#[allow(missing_debug_implementations)]
pub struct AbandoningLaneOptions {
    /// How long a single operation may execute before its worker is abandoned.
    pub execution_timeout: Duration,

    /// Workers spawned up front. Clamped to at least 1.
    pub initial_workers: usize,

    /// Hard cap on workers ever spawned, including respawned replacements. Clamped to
    /// at least `initial_workers`.
    pub max_workers: usize,

    /// Queue caps and the full-queue strategy.
    pub backpressure: BackpressurePolicy,

    /// Which end of the queue workers pop from.
    pub scheduling: Scheduling,

    /// Jobs a worker claims per drain. This runtime always claims one job at a time
    /// (an abandoned worker must never strand other jobs it had already claimed), so
    /// values above 1 are ignored.
    pub batch_size: usize,

    /// Observer for queue-edge transitions.
    pub on_state_transition: Option<TransitionCallback>,
}

impl Default for AbandoningLaneOptions {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            initial_workers: 4,
            max_workers: 32,
            backpressure: BackpressurePolicy::default(),
            scheduling: Scheduling::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            on_state_transition: None,
        }
    }
}

impl AbandoningLaneOptions {
    /// A copy with every field clamped to its documented minimum.
    #[must_use]
    pub(crate) fn normalized(self) -> Self {
        let initial_workers = self.initial_workers.max(1);
        Self {
            initial_workers,
            max_workers: self.max_workers.max(initial_workers),
            backpressure: self.backpressure.clamped(),
            batch_size: self.batch_size.max(1),
            ..self
        }
    }
}
