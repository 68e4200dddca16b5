// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Pop-order and waiter-promotion tests, driven without worker threads.

use super::{test_core, test_core_with, value_op};
use crate::{AdmissionStrategy, Scheduling,
            pool::core::{Admission, WaiterResume, WorkerDirective}};
use pretty_assertions::assert_eq;

/// Admits `values.len()` jobs and returns the tickets in pop order.
fn pop_order(scheduling: Scheduling, values: &[u64]) -> Vec<u64> {
    let core = test_core_with(AdmissionStrategy::FailFast, 16, 16, scheduling, None);
    let mut tickets = Vec::new();
    for value in values {
        if let Admission::Enqueued { job, .. } = core.admit(value_op(*value)) {
            tickets.push(job.ticket);
        }
    }
    match core.next_batch() {
        WorkerDirective::Execute(batch) => {
            batch.iter().map(|job| job.ticket).collect()
        }
        WorkerDirective::Exit => Vec::new(),
    }
}

#[test]
fn fifo_pops_oldest_first() {
    let order = pop_order(Scheduling::Fifo, &[10, 11, 12, 13]);
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn lifo_pops_newest_first() {
    let order = pop_order(Scheduling::Lifo, &[10, 11, 12, 13]);
    assert_eq!(order, vec![3, 2, 1, 0]);
}

#[test]
fn dequeue_promotes_the_head_waiter_under_the_same_lock() {
    let core = test_core(AdmissionStrategy::Wait, 1, 8);

    let Admission::Enqueued { job: first, .. } = core.admit(value_op(1)) else {
        panic!("first submission should enqueue");
    };
    let Admission::Waiting {
        job: second,
        mut admit_rx,
        ..
    } = core.admit(value_op(2))
    else {
        panic!("second submission should wait");
    };

    // One pop: claims `first`, promotes `second` into the freed slot atomically.
    let WorkerDirective::Execute(batch) = core.next_batch() else {
        panic!("queue is non-empty");
    };
    assert_eq!(batch.len(), 2, "promoted job joins the same drain");
    assert_eq!(batch[0].ticket, first.ticket);
    assert_eq!(batch[1].ticket, second.ticket);

    assert!(matches!(admit_rx.try_recv(), Ok(WaiterResume::Enqueued)));

    let metrics = core.snapshot();
    assert_eq!(metrics.acceptance_promoted_total, 1);
    assert_eq!(metrics.acceptance_wait.count, 1);
    assert_eq!(metrics.enqueued_total, 2);
}

#[test]
fn promotion_is_fifo_across_waiters() {
    let core = test_core(AdmissionStrategy::Wait, 1, 8);

    drop(core.admit(value_op(0)));
    let mut waiter_rxs = Vec::new();
    for value in 1..=3 {
        if let Admission::Waiting { admit_rx, job, .. } = core.admit(value_op(value)) {
            waiter_rxs.push((job.ticket, admit_rx));
        }
    }

    // One drain claims the queued job and refills the freed slot from the waiters in
    // order, pulling each promoted job into the same batch, oldest waiter first.
    let mut resolved = Vec::new();
    if let WorkerDirective::Execute(batch) = core.next_batch() {
        for job in batch {
            resolved.push(job.ticket);
        }
    }

    assert_eq!(resolved, vec![0, 1, 2, 3]);
    for (_, mut admit_rx) in waiter_rxs {
        assert!(matches!(admit_rx.try_recv(), Ok(WaiterResume::Enqueued)));
    }
    assert_eq!(core.snapshot().acceptance_promoted_total, 3);
}
