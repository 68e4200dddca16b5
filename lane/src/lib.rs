// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words backpressure respawn respawns syscalls threadpool

//! Blocking lane substrate for async Rust.
//!
//! A **lane** is a uniform contract for "run this synchronous operation, give me a
//! typed result asynchronously". Blocking syscalls, CPU-heavy transforms, and calls
//! into blocking C libraries have no business on async executor threads; a lane moves
//! them onto dedicated OS threads and hands the typed result back to the awaiting
//! task, with bounded memory, typed lifecycle errors, deterministic shutdown, and
//! exactly-once resumption under arbitrary races between completion, cancellation,
//! deadlines, and shutdown.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Lane (handle)                          │
//! │   run / run_result / run_boxed · shutdown · capabilities · metrics  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ThreadsLaneRuntime          AbandoningLaneRuntime                  │
//! │  ├── bounded job queue       ├── everything Threads has, plus:      │
//! │  ├── acceptance waiters      ├── per-job watchdog threads           │
//! │  ├── dedicated workers       ├── worker abandonment + respawn       │
//! │  └── guaranteed execution    └── abandon-on-execution-timeout       │
//! │                                                                     │
//! │  ShardedLane (round-robin composite)      InlineLane (tests)        │
//! │                                                                     │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  HandoffBox        type-erased result transfer, exactly-once        │
//! │  Job               atomic 6-state lifecycle, one terminal CAS wins  │
//! │  BackpressurePolicy / Capabilities / LaneMetrics / errors           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # The Lane Contract
//!
//! 1. **Acceptance is explicit.** A full queue either fails fast (`QueueFull`) or
//!    suspends the caller as an acceptance waiter, per [`BackpressurePolicy`]. The
//!    waiter queue has its own hard cap; beyond it everything is `Overloaded`. Both
//!    bounds hold under any submission rate.
//!
//! 2. **Accepted means resolved.** Every accepted job resolves its caller exactly
//!    once: result delivery, cancellation, execution timeout (abandoning runtime), or
//!    failure. The resolution is decided by a single compare-and-swap on the job's
//!    state; racing paths that lose the CAS destroy whatever they produced and resume
//!    nobody.
//!
//! 3. **Capabilities are truthful.** A lane declares whether it executes on dedicated
//!    threads and how strongly acceptance commits it to execution
//!    ([`ExecutionSemantics`]). Composites take the weakest of their parts.
//!
//! 4. **Shutdown is deterministic.** [`Lane::shutdown()`] drains acceptance waiters
//!    with `ShutdownInProgress`, lets accepted jobs finish, and resolves once every
//!    worker has exited. Calling it twice is the same as calling it once.
//!
//! # Example
//!
//! ```no_run
//! # use r3bl_lane::{Lane, ThreadsLaneOptions};
//! # async fn demo() -> miette::Result<()> {
//! let lane = Lane::threads(ThreadsLaneOptions::default())
//!     .map_err(|e| miette::miette!(e))?;
//!
//! // Blocking work runs on the lane's threads, not the async executor.
//! let checksum = lane
//!     .run(None, || expensive_blocking_checksum("/var/log/big-file"))
//!     .await
//!     .map_err(|e| miette::miette!(e))?;
//!
//! lane.shutdown().await;
//! # drop(checksum);
//! # Ok(())
//! # }
//! # fn expensive_blocking_checksum(_path: &str) -> u64 { 0 }
//! ```
//!
//! # What This Crate Is Not
//!
//! Not a task scheduler, not a readiness/completion reactor (no kqueue / epoll /
//! io_uring here), and not a cross-process coordinator. Lanes accept operations and
//! guarantee what they deliver; everything else composes on top.

#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

mod abandoning_lane;
mod capabilities;
mod deadline;
mod errors;
mod handoff;
mod inline_lane;
mod lane;
mod metrics;
mod policy;
mod pool;
mod sharded_lane;
mod threads_lane;

pub use abandoning_lane::AbandoningLaneOptions;
pub use capabilities::*;
pub use deadline::*;
pub use errors::*;
pub use handoff::*;
pub use lane::Lane;
pub use metrics::*;
pub use policy::*;
pub use threads_lane::{DEFAULT_BATCH_SIZE, ThreadsLaneOptions};
