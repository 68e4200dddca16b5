// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Shared internals of the dedicated-thread runtimes: the job state machine and the
//! coarse-lock pool engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            PoolCore                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Mutex<PoolState>                                                │
//! │  ├── queue: VecDeque<Arc<Job>>      (≤ queue_limit)              │
//! │  ├── waiters: VecDeque<Waiter>      (≤ acceptance_waiters_limit) │
//! │  ├── sleepers / is_shutdown / pool_dead                          │
//! │  └── metrics (counters + latency aggregates)                     │
//! │                                                                  │
//! │  Condvar work_available             (sleepers-gated notify_one)  │
//! │  watch::Sender<usize>               (live workers, for shutdown) │
//! └──────────────────────────────────────────────────────────────────┘
//!        ▲                    ▲                        ▲
//!   submit futures       worker threads          watchdog threads
//!   (admission,          (drain, execute,        (abandoning runtime
//!    cancellation         terminal CAS)           only)
//!    on drop)
//! ```
//!
//! Each [`Job`] carries its own atomic lifecycle tag; every terminal transition is a
//! CAS and exactly one wins, which is what makes completion, cancellation, timeout,
//! and shutdown composable without a per-job lock hierarchy.
//!
//! [`Job`]: job::Job

pub(crate) mod core;
pub(crate) mod job;

#[cfg(test)]
mod tests;
