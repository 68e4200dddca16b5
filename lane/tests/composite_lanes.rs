// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Tests for the composite and degenerate lanes: sharded round-robin, weakest-wins
//! capabilities, aggregated metrics, and the inline lane.

use r3bl_lane::{AbandoningLaneOptions, AdmissionStrategy, BackpressurePolicy,
                ExecutionSemantics, Lane, LaneSpawnError, LifecycleError,
                ThreadsLaneOptions};
use std::time::Duration;

fn small_threads_lane() -> Lane {
    Lane::threads(ThreadsLaneOptions {
        workers: 1,
        backpressure: BackpressurePolicy::new(AdmissionStrategy::Wait, 8),
        ..Default::default()
    })
    .expect("worker threads should spawn")
}

#[tokio::test(flavor = "multi_thread")]
async fn sharded_lane_round_robins_across_shards() {
    // Keep handles to the shards so per-shard counters stay observable.
    let shards: Vec<Lane> = (0..3).map(|_| small_threads_lane()).collect();
    let shard_handles = shards.clone();
    let mut next = shards.into_iter();
    let lane = Lane::sharded(3, move |_| {
        Ok(next.next().expect("factory called once per shard"))
    })
    .unwrap();

    for _ in 0..6 {
        lane.run(None, || ()).await.unwrap();
    }

    for shard in &shard_handles {
        assert_eq!(shard.metrics().enqueued_total, 2, "round-robin is even");
    }
    assert_eq!(lane.metrics().enqueued_total, 6, "aggregate sums the shards");

    lane.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sharded_capabilities_take_the_weakest_member() {
    let lane = Lane::sharded(2, |index| {
        if index == 0 {
            Lane::threads(ThreadsLaneOptions {
                workers: 1,
                ..Default::default()
            })
        } else {
            Lane::abandoning(AbandoningLaneOptions {
                initial_workers: 1,
                max_workers: 1,
                ..Default::default()
            })
        }
    })
    .unwrap();

    assert_eq!(
        lane.capabilities().execution_semantics,
        ExecutionSemantics::AbandonOnExecutionTimeout
    );
    lane.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sharded_shutdown_stops_every_shard() {
    let shards: Vec<Lane> = (0..2).map(|_| small_threads_lane()).collect();
    let shard_handles = shards.clone();
    let mut next = shards.into_iter();
    let lane = Lane::sharded(2, move |_| Ok(next.next().unwrap())).unwrap();

    lane.shutdown().await;

    for shard in &shard_handles {
        let rejected = shard.run(None, || ()).await;
        assert!(matches!(rejected, Err(LifecycleError::ShutdownInProgress)));
        assert_eq!(shard.metrics().workers.active, 0);
    }
}

#[test]
fn zero_shards_is_a_construction_error() {
    let failed = Lane::sharded(0, |_| Ok(Lane::inline()));
    assert!(matches!(failed, Err(LaneSpawnError::Sharding { .. })));
}

#[tokio::test]
async fn inline_lane_runs_on_the_caller_and_counts_completions() {
    let lane = Lane::inline();
    let caller_thread = std::thread::current().id();

    let op_thread = lane.run(None, move || std::thread::current().id()).await.unwrap();
    assert_eq!(op_thread, caller_thread, "inline lane must not change threads");

    assert!(!lane.capabilities().executes_on_dedicated_threads);
    assert_eq!(
        lane.capabilities().execution_semantics,
        ExecutionSemantics::Guaranteed
    );

    let metrics = lane.metrics();
    assert_eq!(metrics.completed_total, 1);
    assert_eq!(metrics.execution.count, 1);

    // Shutdown on the degenerate lane is a no-op, twice over.
    lane.shutdown().await;
    lane.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn sharded_lane_applies_per_shard_backpressure() {
    // Single shard with a single worker: the composite inherits that shard's limits.
    let lane = Lane::sharded(1, |_| {
        Lane::threads(ThreadsLaneOptions {
            workers: 1,
            backpressure: BackpressurePolicy::new(AdmissionStrategy::Wait, 1),
            ..Default::default()
        })
    })
    .unwrap();

    let slow = lane.run(None, || std::thread::sleep(Duration::from_millis(100)));
    let fast = lane.run(None, || ());
    let (slow_outcome, fast_outcome) = tokio::join!(slow, fast);
    assert!(slow_outcome.is_ok());
    assert!(fast_outcome.is_ok());

    lane.shutdown().await;
}
