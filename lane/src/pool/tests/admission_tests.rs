// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Admission-path tests: capacity, fail-fast, waiter registration, overflow, queue
//! edges, and admission-time rejections.

use super::{test_core, test_core_with, value_op};
use crate::{AdmissionStrategy, LaneError, LifecycleError, QueueTransition, Scheduling,
            pool::core::Admission};
use std::sync::{Arc, Mutex};

#[test]
fn fail_fast_rejects_the_submission_past_the_limit() {
    let core = test_core(AdmissionStrategy::FailFast, 2, 8);

    let first = core.admit(value_op(1));
    let second = core.admit(value_op(2));
    let third = core.admit(value_op(3));

    assert!(matches!(first, Admission::Enqueued { .. }));
    assert!(matches!(second, Admission::Enqueued { .. }));
    assert!(matches!(
        third,
        Admission::Rejected(LifecycleError::Failure(LaneError::QueueFull))
    ));

    let metrics = core.snapshot();
    assert_eq!(metrics.enqueued_total, 2);
    assert_eq!(metrics.fail_fast_total, 1);
    assert_eq!(metrics.queue_depth, 2);
}

#[test]
fn wait_strategy_registers_a_waiter_then_overloads() {
    let core = test_core(AdmissionStrategy::Wait, 1, 1);

    let first = core.admit(value_op(1));
    let second = core.admit(value_op(2));
    let third = core.admit(value_op(3));

    assert!(matches!(first, Admission::Enqueued { .. }));
    assert!(matches!(second, Admission::Waiting { .. }));
    assert!(matches!(
        third,
        Admission::Rejected(LifecycleError::Failure(LaneError::Overloaded))
    ));

    let metrics = core.snapshot();
    assert_eq!(metrics.queue_depth, 1);
    assert_eq!(metrics.acceptance_waiters_depth, 1);
    assert_eq!(metrics.overloaded_total, 1);
}

#[test]
fn queue_depth_never_exceeds_the_limit() {
    let core = test_core(AdmissionStrategy::Wait, 3, 16);
    for i in 0..10 {
        drop(core.admit(value_op(i)));
        assert!(core.snapshot().queue_depth <= 3);
    }
}

#[test]
fn shutdown_rejects_new_submissions() {
    let core = test_core(AdmissionStrategy::Wait, 4, 4);
    core.begin_shutdown();

    let rejected = core.admit(value_op(1));
    assert!(matches!(
        rejected,
        Admission::Rejected(LifecycleError::ShutdownInProgress)
    ));
}

#[test]
fn dead_pool_rejects_with_overloaded() {
    let core = test_core(AdmissionStrategy::Wait, 4, 4);
    core.lock_state().pool_dead = true;

    let rejected = core.admit(value_op(1));
    assert!(matches!(
        rejected,
        Admission::Rejected(LifecycleError::Failure(LaneError::Overloaded))
    ));
    assert_eq!(core.snapshot().overloaded_total, 1);
}

#[test]
fn saturating_the_queue_emits_edge_transitions() {
    let seen: Arc<Mutex<Vec<QueueTransition>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: crate::TransitionCallback =
        Arc::new(move |edge| sink.lock().unwrap().push(edge));
    let core = test_core_with(
        AdmissionStrategy::FailFast,
        2,
        8,
        Scheduling::Fifo,
        Some(callback),
    );

    drop(core.admit(value_op(1)));
    drop(core.admit(value_op(2)));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![QueueTransition::BecameNonEmpty, QueueTransition::BecameSaturated]
    );
}

#[test]
fn draining_the_queue_emits_the_opposite_edges() {
    let seen: Arc<Mutex<Vec<QueueTransition>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: crate::TransitionCallback =
        Arc::new(move |edge| sink.lock().unwrap().push(edge));
    let core = test_core_with(
        AdmissionStrategy::FailFast,
        1,
        8,
        Scheduling::Fifo,
        Some(callback),
    );

    drop(core.admit(value_op(1)));
    drop(core.next_batch());

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            QueueTransition::BecameNonEmpty,
            QueueTransition::BecameSaturated,
            QueueTransition::BecameEmpty,
            QueueTransition::BecameNotSaturated,
        ]
    );
}
