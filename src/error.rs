//! Error types used across the crate.

/// [`core::result::Result`] with [`Error`] as the error type.
pub type Result<T> = core::result::Result<T, Error>;

#[derive(PartialEq, Eq, Debug, Clone, Copy, thiserror::Error)]
/// An error returned from a function in this crate.
pub enum Error {
    /// Attempted to allocate a zero-sized block.
    #[error("attempted to allocate a zero-sized block")]
    AllocZeroSize,
    /// The request is larger than a single pool, so it could never fit
    /// without spanning two pools.
    #[error("a request of {size:#x} bytes does not fit in a pool of {pool_size:#x} bytes")]
    RequestTooLarge {
        /// The requested size, including any alignment padding.
        size: usize,
        /// The size of every pool in the allocator.
        pool_size: usize,
    },
    /// The requested alignment was not a power of two, or was larger than the
    /// alignment of the pool buffers.
    #[error("unsupported alignment {align:#x}")]
    InvalidAlign {
        /// The requested alignment.
        align: usize,
    },
    /// Every pool has been handed out. This is permanent for the allocator.
    #[error("capacity exhausted")]
    CapacityExhausted,
    /// The allocation landed in a pool that was never flagged for injection.
    ///
    /// This means a `more_needed` signal was ignored, or an earlier injection
    /// failed.
    #[error("pool {index} was never requested")]
    PoolAbsent {
        /// The index of the absent pool.
        index: usize,
    },
    /// An injection was attempted while no pool was waiting for one.
    #[error("double injection")]
    DoubleInjection,
    /// The backing allocator, or the allocator for the slot table, returned an
    /// error.
    #[error("the allocator returned an error")]
    AllocatorError,
    /// The allocator was created with zero pools.
    #[error("the pool count must be non-zero")]
    InvalidPoolCount,
    /// The pool size, or the total capacity, does not fit in the address
    /// space.
    #[error("the requested pool size would overflow the address space")]
    PoolSizeOverflow,
}
