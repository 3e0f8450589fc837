use core::{alloc::Layout, ptr::NonNull};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use rtbump::{Allocator, Error, Heap, PoolAllocator, SlotState};

/// Forwards to [`Heap`], counting live allocations and refusing to allocate
/// past `limit`.
#[derive(Default)]
struct Counting {
    live: AtomicUsize,
    total: AtomicUsize,
    limit: Option<usize>,
}
impl Counting {
    fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}
unsafe impl Allocator for Counting {
    fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
        if self
            .limit
            .is_some_and(|limit| self.total.load(Ordering::SeqCst) >= limit)
        {
            return None;
        }
        let ptr = Heap.allocate_zeroed(layout)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        unsafe { Heap.deallocate(ptr, layout) }
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn double_injection_leaks_nothing() {
    init_logging();
    let counting = Counting::default();
    let pools = PoolAllocator::<_>::create("leak", 4, 64, &counting).unwrap();
    // The slot table and the first pool.
    assert_eq!(counting.live(), 2);

    assert_eq!(pools.inject().unwrap_err(), Error::DoubleInjection);
    assert_eq!(counting.live(), 2);

    drop(pools);
    assert_eq!(counting.live(), 0);
}

#[test]
fn drop_releases_every_pool() {
    init_logging();
    let counting = Counting::default();
    let pools = PoolAllocator::<_>::create("drop", 4, 64, &counting).unwrap();
    for _ in 0..3 {
        if pools.alloc(64).unwrap().more_needed() {
            pools.inject().unwrap();
        }
    }
    assert_eq!(pools.slot_state(3), Some(SlotState::Ready));
    assert_eq!(counting.live(), 5);
    drop(pools);
    assert_eq!(counting.live(), 0);

    // A pool that was requested but never injected holds nothing.
    let pools = PoolAllocator::<_>::create("drop", 4, 64, &counting).unwrap();
    assert!(pools.alloc(8).unwrap().more_needed());
    assert_eq!(pools.slot_state(1), Some(SlotState::Pending));
    drop(pools);
    assert_eq!(counting.live(), 0);
}

#[test]
fn construction_failure() {
    init_logging();
    let no_table = Counting::with_limit(0);
    assert_eq!(
        PoolAllocator::<_>::create("fail", 4, 64, &no_table).unwrap_err(),
        Error::AllocatorError
    );

    let no_pool = Counting::with_limit(1);
    assert_eq!(
        PoolAllocator::<_>::create("fail", 4, 64, &no_pool).unwrap_err(),
        Error::AllocatorError
    );
    assert_eq!(no_pool.live(), 0);
}

#[test]
fn failed_injection_can_be_retried() {
    init_logging();
    let counting = Counting::with_limit(2);
    let pools = PoolAllocator::<_>::create("retry", 2, 64, &counting).unwrap();
    assert!(pools.alloc(8).unwrap().more_needed());
    assert_eq!(pools.inject().unwrap_err(), Error::AllocatorError);
    assert_eq!(pools.slot_state(1), Some(SlotState::Pending));
    assert!(pools.needs_injection());
}

#[test]
fn allocation_waits_for_injection() {
    init_logging();
    let pools = PoolAllocator::<_>::create("wait", 2, 64, Heap).unwrap();
    assert!(pools.alloc(64).unwrap().more_needed());
    assert_eq!(pools.slot_state(1), Some(SlotState::Pending));

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let block = pools.alloc(32).unwrap();
            assert!(!block.more_needed());
            block.into_slice().iter().all(|&b| b == 0)
        });
        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(pools.inject(), Ok(1));
        assert!(waiter.join().unwrap());
    });
    assert_eq!(pools.alloc(64).unwrap_err(), Error::CapacityExhausted);
}
