//! Allocation-related traits
//!
//! Pools are the only memory this crate takes from a general-purpose
//! allocator, and they are only ever requested from
//! [`inject`](crate::PoolAllocator::inject), which must run on a thread that is
//! allowed to block. In order to facilitate operation in many different
//! environments, the pool buffers come from a type implementing [`Allocator`]
//! rather than from a hard-wired global heap.
//!
//! [`Heap`] forwards to the `alloc` crate's global allocator and is the
//! default. With the `nightly` feature, [`Global`](liballoc::alloc::Global)
//! implements the trait as well.

use core::{alloc::Layout, ptr::NonNull};

/// A generic allocator for pool buffers.
///
/// # Implementing
/// In order to implement this trait, you must implement both
/// [`allocate_zeroed`](Allocator::allocate_zeroed) and
/// [`deallocate`](Allocator::deallocate). Every buffer is requested with the
/// same layout, so implementations are free to keep a cache of buffers of that
/// exact size.
///
/// If an allocator cannot satisfy an allocation, it should return `None`. This
/// will be propagated to the caller via
/// [`Error::AllocatorError`](crate::error::Error::AllocatorError).
///
/// # Safety
/// A returned buffer must be valid for reads and writes of `layout.size()`
/// bytes, aligned to `layout.align()`, filled with zeroes, and must not alias
/// any other live allocation. For more advanced safety concerns, this trait
/// follows the same rules as [`core::alloc::GlobalAlloc`].
pub unsafe trait Allocator {
    /// Allocate a single zero-filled pool buffer.
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>>;
    /// Free a pool buffer.
    ///
    /// # Safety
    /// `ptr` must have been returned by
    /// [`allocate_zeroed`](Allocator::allocate_zeroed) on this allocator with
    /// the same `layout`, and must not have been freed yet.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The global heap, reached through the `alloc` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

unsafe impl Allocator for Heap {
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        NonNull::new(unsafe { liballoc::alloc::alloc_zeroed(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { liballoc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(feature = "nightly")]
unsafe impl Allocator for liballoc::alloc::Global {
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = <Self as core::alloc::Allocator>::allocate_zeroed(self, layout);
        ptr.map(|ptr| ptr.cast()).ok()
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { <Self as core::alloc::Allocator>::deallocate(self, ptr, layout) }
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate_zeroed(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_buffers_are_zeroed() {
        let layout = Layout::from_size_align(0x100, 0x40).unwrap();
        let ptr = Heap.allocate_zeroed(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 0x40, 0);
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 0x100) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { Heap.deallocate(ptr, layout) };
    }

    #[test]
    fn heap_rejects_zero_size() {
        let layout = Layout::from_size_align(0, 1).unwrap();
        assert!(Heap.allocate_zeroed(layout).is_none());
    }
}
