// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Tests for the pool engine's state machine: admission, scheduling + promotion, and
//! the lifecycle races (cancellation, shutdown, deadlines). Workers are driven by
//! hand here - [`PoolCore::next_batch`] and [`PoolCore::begin_job`] are called from
//! the test thread - so every interleaving is deterministic. The spawned-thread
//! behavior is covered by the crate-level scenario tests.
//!
//! [`PoolCore::begin_job`]: super::core::PoolCore::begin_job
//! [`PoolCore::next_batch`]: super::core::PoolCore::next_batch

mod admission_tests;
mod scheduling_tests;

use super::{core::{PoolCore, PoolSettings},
            job::BoxedOperation};
use crate::{AdmissionStrategy, HandoffBox, Scheduling, TransitionCallback};
use std::sync::Arc;

/// A pool core with no worker threads; tests drive it by hand.
fn test_core(
    strategy: AdmissionStrategy,
    queue_limit: usize,
    acceptance_waiters_limit: usize,
) -> Arc<PoolCore> {
    test_core_with(strategy, queue_limit, acceptance_waiters_limit, Scheduling::Fifo, None)
}

fn test_core_with(
    strategy: AdmissionStrategy,
    queue_limit: usize,
    acceptance_waiters_limit: usize,
    scheduling: Scheduling,
    on_transition: Option<TransitionCallback>,
) -> Arc<PoolCore> {
    Arc::new(PoolCore::new(PoolSettings {
        queue_limit,
        acceptance_waiters_limit,
        strategy,
        scheduling,
        batch_size: 16,
        on_transition,
    }))
}

/// An operation that just boxes the given value.
fn value_op(value: u64) -> BoxedOperation { Box::new(move || HandoffBox::new(value)) }
