#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, doc, feature = "std")), no_std)]
#![cfg_attr(feature = "nightly", feature(allocator_api))]
#![deny(missing_docs)]

extern crate alloc as liballoc;

use core::{alloc::Layout, fmt::Debug, marker::PhantomData, ptr::NonNull};

use cursor::{Coord, Cursor, Geometry};
use slot::{Install, Lookup, SlotTable};

#[doc(inline)]
pub use crate::alloc::{Allocator, Heap};
pub use crate::cursor::POOL_ALIGN;
#[doc(inline)]
pub use error::*;
#[doc(inline)]
pub use relax::{RelaxStrategy, Spin};

pub mod alloc;
pub mod error;
pub mod relax;

mod cursor;
mod slot;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
/// The state of one pool slot.
pub enum SlotState {
    /// No buffer, and none has been requested.
    Absent,
    /// An allocation has requested a buffer for this slot, and it has not been
    /// injected yet.
    Pending,
    /// The slot holds a buffer.
    Ready,
}

/// A block of memory handed out by [`PoolAllocator::alloc`].
///
/// The block stays valid for as long as the allocator it came from. Every
/// block is handed out exactly once and never overlaps another block, which is
/// what makes [`into_slice`](Allocation::into_slice) safe.
#[derive(Debug)]
pub struct Allocation<'a> {
    ptr: NonNull<u8>,
    len: usize,
    more_needed: bool,
    _marker: PhantomData<&'a mut [u8]>,
}
impl<'a> Allocation<'a> {
    /// Whether this allocation was the one to request the next pool.
    ///
    /// When this is `true`, [`PoolAllocator::inject`] must be called from a
    /// non-real-time thread before the allocator runs into that pool.
    pub fn more_needed(&self) -> bool {
        self.more_needed
    }

    /// The start of the block.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The length of the block, in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block is empty. Blocks handed out by the allocator never
    /// are.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Turn the allocation into a mutable slice borrowing the allocator.
    ///
    /// The memory is zeroed when the pool is injected, so a fresh block reads
    /// as zeroes.
    pub fn into_slice(self) -> &'a mut [u8] {
        // No other allocation overlaps this block, and the allocator never
        // touches bytes it has handed out.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Turn the allocation into a raw pointer that no longer borrows the
    /// allocator.
    ///
    /// The pointer stays valid until the allocator is dropped; keeping track of
    /// that is up to the caller.
    pub fn into_raw(self) -> NonNull<[u8]> {
        NonNull::slice_from_raw_parts(self.ptr, self.len)
    }
}
unsafe impl Send for Allocation<'_> {}
unsafe impl Sync for Allocation<'_> {}

/// A lock-free, segmented bump allocator.
///
/// Memory is carved out of `pool_count` pools of `pool_size` bytes each. A
/// single atomic cursor is bumped by every allocation, so allocating is a
/// handful of atomic operations and never calls into a general-purpose
/// allocator. That makes [`alloc`](PoolAllocator::alloc) usable from real-time
/// threads, such as an audio callback.
///
/// Pools are not allocated up front. The first pool is injected by
/// [`create`](PoolAllocator::create); after that, the first allocation to use
/// a pool requests the pool after it, and reports so through
/// [`Allocation::more_needed`]. Some non-real-time thread must then call
/// [`inject`](PoolAllocator::inject), which allocates the buffer through the
/// backing [`Allocator`] and installs it.
///
/// Memory is never freed individually. Everything is released when the
/// allocator is dropped, and once the last pool is used up, every further
/// allocation fails with [`Error::CapacityExhausted`].
///
/// # Usage
/// ```rust
/// # use rtbump::{PoolAllocator, Heap};
/// let pools = PoolAllocator::<_>::create("scratch", 4, 1024, Heap).unwrap();
/// assert_eq!(pools.pool_size(), 1024);
///
/// let block = pools.alloc(256).unwrap();
/// if block.more_needed() {
///     // In a real host this happens on another thread.
///     pools.inject().unwrap();
/// }
/// let bytes = block.into_slice();
/// bytes.fill(0xaa);
/// ```
/// > #### Why `unwrap`?
/// > `create` only fails if the pool count is zero, the sizes overflow, or the
/// > heap is out of memory, none of which apply here.
///
/// # Usage rules
/// - `inject` may allocate and block. Never call it on a real-time thread.
/// - Every `more_needed` signal must be answered with exactly one `inject`.
///   Injecting without a pending request fails with
///   [`Error::DoubleInjection`]; ignoring a request makes later allocations
///   spin forever waiting for that pool.
/// - Pools are requested and filled in index order. Requests larger than half
///   a pool can skip over a whole pool while straddling, which lands them in a
///   pool nobody requested ([`Error::PoolAbsent`]). Size pools at least twice
///   as large as the largest request.
pub struct PoolAllocator<'label, A: Allocator = Heap, R: RelaxStrategy = Spin> {
    label: &'label str,
    geometry: Geometry,
    cursor: Cursor,
    slots: SlotTable,
    allocator: A,
    _relax: PhantomData<fn() -> R>,
}
impl<'label, A: Allocator, R: RelaxStrategy> PoolAllocator<'label, A, R> {
    /// Create a new allocator and inject its first pool.
    ///
    /// # Parameters
    /// - `label` - a label for the allocator. This is used for debugging
    ///   purposes.
    /// - `pool_count` - the number of pools. Together with the pool size this
    ///   fixes the total capacity; it never grows.
    /// - `min_pool_size` - the minimum size of a pool, in bytes. The actual
    ///   pool size is the smallest power of two greater than or equal to it.
    /// - `allocator` - the allocator used for pool buffers and the slot table.
    ///
    /// # Returns
    /// If the allocator could not be created, one of these errors will be
    /// returned:
    /// - [`Error::InvalidPoolCount`] - `pool_count` is zero.
    /// - [`Error::PoolSizeOverflow`] - the pool size or the total capacity is
    ///   too large for the address space.
    /// - [`Error::AllocatorError`] - the slot table or the first pool could not
    ///   be allocated.
    pub fn create(
        label: &'label str,
        pool_count: usize,
        min_pool_size: usize,
        allocator: A,
    ) -> error::Result<Self> {
        let geometry = Geometry::new(pool_count, min_pool_size)?;
        let slots = SlotTable::new_in(pool_count, &allocator).ok_or(Error::AllocatorError)?;
        slots[0].request();

        let this = Self {
            label,
            geometry,
            cursor: Cursor::new(),
            slots,
            allocator,
            _relax: PhantomData,
        };
        this.inject()?;

        log::info!(
            "{}: created with {} pools of {:#x} bytes",
            label,
            pool_count,
            geometry.pool_size()
        );
        Ok(this)
    }

    /// Allocate a block of `size` bytes.
    ///
    /// This never blocks and never calls into the backing allocator. If the
    /// pool the block falls in is still being injected, it spins until the
    /// injection lands.
    ///
    /// # Returns
    /// On success, the block, along with whether the caller has to arrange for
    /// an [`inject`](PoolAllocator::inject). Otherwise, one of the following
    /// errors will be returned:
    /// - [`Error::AllocZeroSize`] - `size` is zero.
    /// - [`Error::RequestTooLarge`] - `size` is larger than a pool.
    /// - [`Error::CapacityExhausted`] - every pool has been used up.
    /// - [`Error::PoolAbsent`] - the block fell in a pool that was never
    ///   requested. See the usage rules on [`PoolAllocator`].
    pub fn alloc(&self, size: usize) -> error::Result<Allocation<'_>> {
        self.alloc_aligned(size, 1)
    }

    /// Allocate a block of `size` bytes whose address is a multiple of
    /// `align`.
    ///
    /// `align` must be a power of two no larger than the alignment of the pool
    /// buffers (the smaller of [`POOL_ALIGN`] and the pool size), otherwise
    /// [`Error::InvalidAlign`] is returned. The request is padded by
    /// `align - 1` bytes, and the padded size must fit in a pool. Apart from
    /// that, this behaves exactly like [`alloc`](PoolAllocator::alloc).
    pub fn alloc_aligned(&self, size: usize, align: usize) -> error::Result<Allocation<'_>> {
        if size == 0 {
            return Err(Error::AllocZeroSize);
        }
        if !align.is_power_of_two() || align > self.geometry.buffer_layout().align() {
            return Err(Error::InvalidAlign { align });
        }
        let pool_size = self.geometry.pool_size();
        let padded = match size.checked_add(align - 1) {
            Some(padded) if padded <= pool_size => padded,
            _ => {
                return Err(Error::RequestTooLarge {
                    size: size.saturating_add(align - 1),
                    pool_size,
                })
            }
        };

        let capacity = self.geometry.capacity();
        loop {
            // Keeps an allocator that is already exhausted from pushing the
            // cursor any further.
            if self.cursor.get() >= capacity {
                return Err(Error::CapacityExhausted);
            }
            let offset = self.cursor.reserve(padded);
            let Coord { index, local } = self.geometry.locate(offset);
            if index >= self.geometry.pool_count() {
                return Err(Error::CapacityExhausted);
            }
            if local + padded > pool_size {
                // Straddles two pools. The reservation is wasted.
                continue;
            }

            let slot = &self.slots[index];
            let buffer = relax::spin_until::<R, _>(|| match slot.lookup() {
                Lookup::Ready(buffer) => Some(Ok(buffer)),
                Lookup::Pending => None,
                Lookup::Absent => Some(Err(Error::PoolAbsent { index })),
            })?;

            let more_needed = self
                .slots
                .get(index + 1)
                .is_some_and(|next| next.request());

            let start = (local + align - 1) & !(align - 1);
            return Ok(Allocation {
                ptr: unsafe { NonNull::new_unchecked(buffer.as_ptr().add(start)) },
                len: size,
                more_needed,
                _marker: PhantomData,
            });
        }
    }

    /// Allocate a block that satisfies `layout`.
    ///
    /// Forwards to [`alloc_aligned`](PoolAllocator::alloc_aligned).
    pub fn alloc_layout(&self, layout: Layout) -> error::Result<Allocation<'_>> {
        self.alloc_aligned(layout.size(), layout.align())
    }

    /// Allocate a pool buffer and install it in the pool waiting for one.
    ///
    /// This calls into the backing allocator, so it must not run on a
    /// real-time thread. Slots are scanned in order; the buffer goes to the
    /// first pending one.
    ///
    /// # Returns
    /// The index of the filled slot. Otherwise, one of the following errors
    /// will be returned:
    /// - [`Error::DoubleInjection`] - no slot was waiting for a buffer. The
    ///   buffer is freed again.
    /// - [`Error::AllocatorError`] - the backing allocator failed.
    pub fn inject(&self) -> error::Result<usize> {
        let layout = self.geometry.buffer_layout();
        let Some(buffer) = self.allocator.allocate_zeroed(layout) else {
            log::warn!("{}: could not allocate a pool buffer", self.label);
            return Err(Error::AllocatorError);
        };

        for (index, slot) in self.slots.iter().enumerate() {
            match slot.try_install(buffer) {
                Install::Installed => {
                    log::debug!(
                        "{}: injected pool {} at {:#x}",
                        self.label,
                        index,
                        buffer.as_ptr() as usize
                    );
                    return Ok(index);
                }
                Install::Occupied => continue,
                Install::Absent => break,
            }
        }

        unsafe { self.allocator.deallocate(buffer, layout) };
        log::warn!("{}: double injection", self.label);
        Err(Error::DoubleInjection)
    }

    /// Whether some slot is waiting for an [`inject`](PoolAllocator::inject).
    pub fn needs_injection(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.state() == SlotState::Pending)
    }

    /// Get the state of the slot at `index`, or `None` if it is out of range.
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(|slot| slot.state())
    }

    /// Get the number of pools that currently hold a buffer.
    pub fn ready_pools(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state() == SlotState::Ready)
            .count()
    }

    /// Get the number of bytes reserved so far, including padding and space
    /// wasted by straddling requests. Never larger than
    /// [`capacity`](PoolAllocator::capacity).
    pub fn reserved(&self) -> usize {
        self.cursor.get().min(self.geometry.capacity())
    }

    /// Get the size of every pool, in bytes. Always a power of two.
    pub fn pool_size(&self) -> usize {
        self.geometry.pool_size()
    }

    /// Get the number of pools.
    pub fn pool_count(&self) -> usize {
        self.geometry.pool_count()
    }

    /// Get the total number of bytes this allocator can ever hand out.
    pub fn capacity(&self) -> usize {
        self.geometry.capacity()
    }

    /// Get the label for this allocator.
    pub fn label(&self) -> &'label str {
        self.label
    }
}
impl<A: Allocator, R: RelaxStrategy> Debug for PoolAllocator<'_, A, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "PoolAllocator {} with:", self.label)?;
        writeln!(
            f,
            "  Reserved: {:#x} of {:#x}",
            self.reserved(),
            self.capacity()
        )?;
        for (index, slot) in self.slots.iter().enumerate() {
            writeln!(f, "  Pool {index} ({:#x} bytes): {slot:?}", self.pool_size())?;
        }
        Ok(())
    }
}
impl<A: Allocator, R: RelaxStrategy> Drop for PoolAllocator<'_, A, R> {
    fn drop(&mut self) {
        let layout = self.geometry.buffer_layout();
        let mut released = 0;
        for slot in self.slots.iter_mut() {
            if let Some(buffer) = slot.take_buffer() {
                unsafe { self.allocator.deallocate(buffer, layout) };
                released += 1;
            }
        }
        unsafe { self.slots.free_in(&self.allocator) };
        log::debug!("{}: released {} pools", self.label, released);
    }
}
