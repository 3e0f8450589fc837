use core::{
    alloc::Layout,
    fmt::Debug,
    ops::Deref,
    ptr::{self, NonNull},
};

use portable_atomic::{AtomicPtr, AtomicU8, Ordering};

use crate::{alloc::Allocator, SlotState};

const ABSENT: u8 = 0;
const PENDING: u8 = 1;
/// An injector has claimed the slot and is publishing its buffer. Reported as
/// pending to everyone else.
const INSTALLING: u8 = 2;
const READY: u8 = 3;

/// One entry of the pool table.
///
/// The state only ever moves forward: absent, pending, installing, ready. The
/// buffer pointer is written exactly once, by the injector that won the
/// pending to installing transition, and is published by the release store
/// of the ready state.
pub struct Slot {
    state: AtomicU8,
    buffer: AtomicPtr<u8>,
}

/// The result of looking at a slot from the allocation path.
pub enum Lookup {
    Absent,
    Pending,
    Ready(NonNull<u8>),
}

/// The result of offering a buffer to a slot.
pub enum Install {
    Installed,
    /// The slot already has a buffer, or another injector is installing one.
    Occupied,
    Absent,
}

impl Slot {
    pub const ABSENT: Self = Self {
        state: AtomicU8::new(ABSENT),
        buffer: AtomicPtr::new(ptr::null_mut()),
    };

    pub fn state(&self) -> SlotState {
        match self.state.load(Ordering::Acquire) {
            ABSENT => SlotState::Absent,
            PENDING | INSTALLING => SlotState::Pending,
            _ => SlotState::Ready,
        }
    }

    pub fn lookup(&self) -> Lookup {
        match self.state.load(Ordering::Acquire) {
            ABSENT => Lookup::Absent,
            PENDING | INSTALLING => Lookup::Pending,
            _ => match NonNull::new(self.buffer.load(Ordering::Relaxed)) {
                Some(buffer) => Lookup::Ready(buffer),
                None => unreachable!("ready slot without a buffer"),
            },
        }
    }

    /// Flag the slot as waiting for a buffer. Returns `true` only for the
    /// caller that performed the transition.
    pub fn request(&self) -> bool {
        self.state
            .compare_exchange(ABSENT, PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn try_install(&self, buffer: NonNull<u8>) -> Install {
        match self.state.compare_exchange(
            PENDING,
            INSTALLING,
            Ordering::Acquire,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.buffer.store(buffer.as_ptr(), Ordering::Relaxed);
                self.state.store(READY, Ordering::Release);
                Install::Installed
            }
            Err(ABSENT) => Install::Absent,
            Err(_) => Install::Occupied,
        }
    }

    /// Remove the buffer from a ready slot, leaving it absent.
    pub fn take_buffer(&mut self) -> Option<NonNull<u8>> {
        let state = core::mem::replace(self.state.get_mut(), ABSENT);
        let buffer = core::mem::replace(self.buffer.get_mut(), ptr::null_mut());
        if state == READY {
            NonNull::new(buffer)
        } else {
            None
        }
    }
}
impl Debug for Slot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.lookup() {
            Lookup::Absent => write!(f, "Absent"),
            Lookup::Pending => write!(f, "Pending"),
            Lookup::Ready(buffer) => write!(f, "Ready at {:#x}", buffer.as_ptr() as usize),
        }
    }
}

/// A fixed-length array of slots, allocated through the same [`Allocator`] as
/// the pools themselves.
pub struct SlotTable {
    slots: NonNull<Slot>,
    len: usize,
}
impl SlotTable {
    pub fn new_in(len: usize, allocator: &impl Allocator) -> Option<Self> {
        let slots = allocator
            .allocate_zeroed(Self::layout(len)?)?
            .cast::<Slot>();
        for i in 0..len {
            unsafe { slots.as_ptr().add(i).write(Slot::ABSENT) };
        }
        Some(Self { slots, len })
    }

    fn layout(len: usize) -> Option<Layout> {
        Layout::array::<Slot>(len).ok()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        unsafe { core::slice::from_raw_parts_mut(self.slots.as_ptr(), self.len) }.iter_mut()
    }

    /// # Safety
    /// The table must have been created by [`new_in`](SlotTable::new_in) with
    /// the same allocator, and must not be used afterwards.
    pub unsafe fn free_in(&mut self, allocator: &impl Allocator) {
        if let Some(layout) = Self::layout(self.len) {
            unsafe { allocator.deallocate(self.slots.cast(), layout) };
        }
    }
}
impl Deref for SlotTable {
    type Target = [Slot];

    fn deref(&self) -> &[Slot] {
        unsafe { core::slice::from_raw_parts(self.slots.as_ptr(), self.len) }
    }
}
// The table only hands out shared references to atomics.
unsafe impl Send for SlotTable {}
unsafe impl Sync for SlotTable {}
