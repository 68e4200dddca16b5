// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A lane composed of N independent sub-lanes with round-robin dispatch.

use crate::{Capabilities, Deadline, HandoffBox, LaneFailure, LaneMetrics,
            lane::{Lane, RawLane},
            pool::job::BoxedOperation};
use futures_util::future::{BoxFuture, join_all};
use std::sync::{Arc,
                atomic::{AtomicUsize, Ordering}};

/// Dispatches each submission to one of N sub-lanes by atomic round-robin. There is
/// no shared queue: each shard applies its own backpressure independently, so
/// `QueueFull` on one shard does not consult the others.
///
/// Capabilities are the weakest-wins meet of all shards; a composite can only promise
/// what its weakest member delivers. Metrics are aggregated across shards.
#[allow(missing_debug_implementations)]
pub(crate) struct ShardedLane {
    shards: Vec<Lane>,
    cursor: AtomicUsize,
}

impl ShardedLane {
    /// `shards` must be non-empty; [`Lane::sharded()`] enforces that.
    pub(crate) fn new(shards: Vec<Lane>) -> Self {
        Self {
            shards,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl RawLane for ShardedLane {
    fn run_boxed(
        self: Arc<Self>,
        deadline: Option<Deadline>,
        op: BoxedOperation,
    ) -> BoxFuture<'static, Result<HandoffBox, LaneFailure>> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        self.shards[index].submit_boxed(deadline, op)
    }

    fn shutdown(self: Arc<Self>) -> BoxFuture<'static, ()> {
        let shards = self.shards.clone();
        Box::pin(async move {
            drop(join_all(shards.iter().map(Lane::shutdown)).await);
        })
    }

    fn capabilities(&self) -> Capabilities {
        let mut shards = self.shards.iter();
        let first = shards
            .next()
            .map(Lane::capabilities)
            .unwrap_or(Capabilities {
                executes_on_dedicated_threads: false,
                execution_semantics: crate::ExecutionSemantics::Guaranteed,
            });
        shards.fold(first, |met, shard| met.meet(shard.capabilities()))
    }

    fn metrics(&self) -> LaneMetrics {
        let mut aggregate = LaneMetrics::default();
        for shard in &self.shards {
            aggregate.absorb(&shard.metrics());
        }
        aggregate
    }
}
