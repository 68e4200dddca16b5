// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The default lane runtime: a fixed pool of dedicated worker threads over the shared
//! pool engine. See [`ThreadsLaneOptions`] and [`Lane::threads()`].
//!
//! Data flow for one submission:
//!
//! ```text
//! caller ──admit──► job queue ──drain──► worker thread ──► operation()
//!    ▲                  │                     │
//!    │                  │ full? wait /        │ terminal CAS
//!    │                  ▼ fail-fast           ▼
//!    └──────── completion slot ◄──── result box (worker side)
//! ```
//!
//! Accepted jobs always run to completion, including during shutdown, which is what
//! lets this runtime declare [`ExecutionSemantics::Guaranteed`].
//!
//! [`ExecutionSemantics::Guaranteed`]: crate::ExecutionSemantics::Guaranteed
//! [`Lane::threads()`]: crate::Lane::threads

mod runtime;
mod worker;

pub(crate) use runtime::*;

use crate::{BackpressurePolicy, Scheduling, TransitionCallback};

/// Default number of jobs a worker claims per drain.
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Configuration for [`Lane::threads()`].
///
/// All fields have usable defaults; zero values are clamped to their documented
/// minimums at construction.
///
/// [`Lane::threads()`]: crate::Lane::threads
#[allow(missing_debug_implementations)]
pub struct ThreadsLaneOptions {
    /// Number of dedicated worker threads. Defaults to the processor count; clamped to
    /// at least 1.
    pub workers: usize,

    /// Queue caps and the full-queue strategy.
    pub backpressure: BackpressurePolicy,

    /// Which end of the queue workers pop from.
    pub scheduling: Scheduling,

    /// Maximum jobs a worker claims per drain. Applies only while no peer worker is
    /// parked; a worker with parked peers claims one job at a time so a burst fans
    /// out across the pool instead of serializing on one thread. Clamped to at
    /// least 1.
    pub batch_size: usize,

    /// Observer for queue-edge transitions.
    pub on_state_transition: Option<TransitionCallback>,
}

impl Default for ThreadsLaneOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map_or(4, std::num::NonZeroUsize::get),
            backpressure: BackpressurePolicy::default(),
            scheduling: Scheduling::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            on_state_transition: None,
        }
    }
}

impl ThreadsLaneOptions {
    /// A copy with every field clamped to its documented minimum.
    #[must_use]
    pub(crate) fn normalized(self) -> Self {
        Self {
            workers: self.workers.max(1),
            backpressure: self.backpressure.clamped(),
            batch_size: self.batch_size.max(1),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_documented_values() {
        let options = ThreadsLaneOptions::default();
        assert!(options.workers >= 1);
        assert_eq!(options.batch_size, 16);
        assert_eq!(options.backpressure.queue_limit, 256);
        assert_eq!(options.scheduling, Scheduling::Fifo);
    }

    #[test]
    fn normalized_clamps_zeros() {
        let options = ThreadsLaneOptions {
            workers: 0,
            batch_size: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(options.workers, 1);
        assert_eq!(options.batch_size, 1);
    }
}
