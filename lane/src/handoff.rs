// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words deinitialize deinitialized downcasts

//! Type-erased, exactly-once transfer of a typed result across the worker/async
//! boundary. See [`HandoffBox`].

use std::any::Any;

/// A heap container that moves a typed value (or a typed `Result`) from the worker
/// thread that produced it to the async caller that knows its type.
///
/// The producer side never needs to name `T`: a worker holds only the erased box and
/// either hands it to the completion slot or drops it. The consumer side re-introduces
/// the type at the single place where it is statically known (the typed `run` wrappers
/// on [`Lane`]).
///
/// # Layout
///
/// The erasure is `Box<dyn Any + Send>`. That is exactly the two-part design this
/// container needs:
///
/// ```text
/// HandoffBox ──► fat pointer ──┬── payload allocation (the value / Result)
///                              └── vtable (carries the destroy thunk for the payload)
/// ```
///
/// The vtable's drop glue deinitializes the payload without the dropping code knowing
/// `T`, so abandoned boxes (a worker that lost the terminal race) are released by a
/// plain `drop`.
///
/// # Exactly-Once Consumption
///
/// `take_value` and `take_result` consume `self`; move semantics make "take or destroy,
/// never both, never twice" a compile-time property rather than a runtime flag.
///
/// # Producer/Consumer Contract
///
/// - The payload is allocated on the **worker** side, immediately before the terminal
///   state transition. Admission never allocates a box.
/// - If the worker loses the terminal race (the job was cancelled or timed out first),
///   the worker drops the box it produced. The winner's resumption path is the only
///   reader.
/// - A failed downcast in `take_*` means the producer and consumer disagreed on the
///   type, which can only happen if the typed wrappers' discipline was broken. Callers
///   map `None` to an internal invariant violation.
///
/// [`Lane`]: crate::Lane
#[allow(missing_debug_implementations)]
pub struct HandoffBox {
    payload: Box<dyn Any + Send + 'static>,
}

impl HandoffBox {
    /// Boxes a bare value produced by a non-fallible operation.
    #[must_use]
    pub fn new<T>(value: T) -> Self
    where
        T: Send + 'static,
    {
        Self {
            payload: Box::new(value),
        }
    }

    /// Boxes a `Result` produced by a fallible operation.
    ///
    /// The operation's own error type `E` rides inside the payload; it is never
    /// converted into a lane error.
    #[must_use]
    pub fn from_result<T, E>(result: Result<T, E>) -> Self
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        Self::new(result)
    }

    /// Consumes the box, returning the bare value stored by [`new`].
    ///
    /// Returns [`None`] if the payload is not a `T`. See the type-level docs for why
    /// that is an invariant violation rather than a recoverable condition.
    ///
    /// [`new`]: Self::new
    #[must_use]
    pub fn take_value<T>(self) -> Option<T>
    where
        T: Send + 'static,
    {
        self.payload.downcast::<T>().ok().map(|it| *it)
    }

    /// Consumes the box, returning the `Result` stored by [`from_result`].
    ///
    /// [`from_result`]: Self::from_result
    #[must_use]
    pub fn take_result<T, E>(self) -> Option<Result<T, E>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        self.take_value::<Result<T, E>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc,
                    atomic::{AtomicUsize, Ordering}};

    #[test]
    fn value_round_trips() {
        let boxed = HandoffBox::new(42_u64);
        assert_eq!(boxed.take_value::<u64>(), Some(42));
    }

    #[test]
    fn result_round_trips_ok_and_err() {
        let ok: Result<u32, String> = Ok(7);
        let boxed = HandoffBox::from_result(ok);
        assert_eq!(boxed.take_result::<u32, String>(), Some(Ok(7)));

        let err: Result<u32, String> = Err("nope".into());
        let boxed = HandoffBox::from_result(err);
        assert_eq!(boxed.take_result::<u32, String>(), Some(Err("nope".into())));
    }

    #[test]
    fn wrong_type_take_returns_none() {
        let boxed = HandoffBox::new("text");
        assert_eq!(boxed.take_value::<u64>(), None);
    }

    /// Payload whose drop increments a counter, to observe the destroy path.
    struct CountsDrops(Arc<AtomicUsize>);

    impl Drop for CountsDrops {
        fn drop(&mut self) { self.0.fetch_add(1, Ordering::SeqCst); }
    }

    #[test]
    fn dropping_the_box_destroys_the_payload_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let boxed = HandoffBox::new(CountsDrops(Arc::clone(&drops)));
        drop(boxed);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn taking_the_value_does_not_double_destroy() {
        let drops = Arc::new(AtomicUsize::new(0));
        let boxed = HandoffBox::new(CountsDrops(Arc::clone(&drops)));
        let value = boxed.take_value::<CountsDrops>().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(value);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
