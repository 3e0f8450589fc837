//! Spin-wait strategies.
//!
//! An allocation that lands in a pool which is still being injected has to
//! wait for the injecting thread to publish the buffer. Blocking is not an
//! option on a real-time thread, so the wait is a spin loop, and the strategy
//! used on every iteration of that loop is chosen through the
//! [`RelaxStrategy`] type parameter of [`PoolAllocator`](crate::PoolAllocator).
//!
//! # Default implementations
//! [`Spin`] issues a CPU spin-loop hint and is the default. With the `std`
//! feature, `Yield` is also available; it yields the time slice back to the
//! OS scheduler, which is friendlier when there are more spinning threads than
//! cores (as in stress tests), but is a system call. Users are free to
//! implement [`RelaxStrategy`] for a custom type, for example one that bumps a
//! contention counter.
//!
//! Waits are expected to be short: injection only has to store one pointer
//! once its buffer has been allocated, and the look-ahead in
//! [`alloc`](crate::PoolAllocator::alloc) requests a pool one whole pool ahead
//! of when it is needed.

pub use spin::relax::{RelaxStrategy, Spin};

#[cfg(feature = "std")]
pub use spin::relax::Yield;

/// Spin until `done` returns `Some`, relaxing with `R` between attempts.
#[inline]
pub(crate) fn spin_until<R: RelaxStrategy, T>(mut done: impl FnMut() -> Option<T>) -> T {
    loop {
        if let Some(value) = done() {
            return value;
        }
        R::relax();
    }
}
