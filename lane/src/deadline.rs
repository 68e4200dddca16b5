// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Monotonic, sleep-aware instants used to bound lane acceptance. See [`Deadline`].

use std::time::Duration;
use tokio::time::Instant;

/// A point on the monotonic clock by which a lane must have **accepted** a submission.
///
/// Deadlines bound acceptance time only: once a job is in the queue it runs to
/// completion regardless of the deadline. (The abandoning runtime separately bounds
/// execution via its own `execution_timeout`, which is unrelated to this type.)
///
/// Built on [`tokio::time::Instant`] so acceptance waits cooperate with tokio's timer
/// wheel and with [`tokio::time`]'s test utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline at the given instant.
    #[must_use]
    pub fn at(instant: Instant) -> Self { Self { at: instant } }

    /// A deadline `duration` from now.
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    /// Whether the deadline has already passed.
    #[must_use]
    pub fn is_expired(&self) -> bool { Instant::now() >= self.at }

    /// The underlying instant, for use with [`tokio::time::timeout_at`].
    #[must_use]
    pub fn instant(&self) -> Instant { self.at }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self { Self::at(instant) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn future_deadline_is_not_expired() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
    }

    #[tokio::test]
    async fn past_deadline_is_expired() {
        let deadline = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn ordering_follows_the_clock() {
        let sooner = Deadline::after(Duration::from_secs(1));
        let later = Deadline::after(Duration::from_secs(2));
        assert!(sooner < later);
    }
}
