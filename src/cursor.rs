use core::alloc::Layout;

use portable_atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};

/// The largest alignment of a pool buffer.
///
/// Pools smaller than this are aligned to their own size instead.
pub const POOL_ALIGN: usize = 64;

/// The shape of the logical address space: `pool_count` pools of
/// `mask + 1` bytes each.
#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    shift: u32,
    mask: usize,
    pool_count: usize,
    buffer_layout: Layout,
}

/// A cursor value split into the pool it falls in and the offset inside it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Coord {
    pub index: usize,
    pub local: usize,
}

impl Geometry {
    pub fn new(pool_count: usize, min_pool_size: usize) -> Result<Self> {
        if pool_count == 0 {
            return Err(Error::InvalidPoolCount);
        }
        let pool_size = min_pool_size
            .max(1)
            .checked_next_power_of_two()
            .ok_or(Error::PoolSizeOverflow)?;
        // Leave half of the address space free so that allocations racing
        // past the end cannot wrap the cursor.
        match pool_count.checked_mul(pool_size) {
            Some(capacity) if capacity <= usize::MAX / 2 => {}
            _ => return Err(Error::PoolSizeOverflow),
        }
        let buffer_layout = Layout::from_size_align(pool_size, pool_size.min(POOL_ALIGN))
            .map_err(|_| Error::PoolSizeOverflow)?;

        Ok(Self {
            shift: pool_size.trailing_zeros(),
            mask: pool_size - 1,
            pool_count,
            buffer_layout,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.mask + 1
    }

    pub fn pool_count(&self) -> usize {
        self.pool_count
    }

    pub fn capacity(&self) -> usize {
        self.pool_count << self.shift
    }

    /// The layout every pool buffer is allocated with.
    pub fn buffer_layout(&self) -> Layout {
        self.buffer_layout
    }

    pub fn locate(&self, offset: usize) -> Coord {
        Coord {
            index: offset >> self.shift,
            local: offset & self.mask,
        }
    }
}

/// The bump cursor. Every reservation gets a range that no other reservation
/// will ever overlap, whether or not it ends up being used.
#[derive(Debug, Default)]
pub struct Cursor(AtomicUsize);

impl Cursor {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Reserve `size` bytes, returning the start of the reserved range.
    #[inline]
    pub fn reserve(&self, size: usize) -> usize {
        self.0.fetch_add(size, Ordering::Relaxed)
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn locate_splits_offsets() {
        let geometry = Geometry::new(4, 64).unwrap();
        assert_eq!(geometry.locate(0), Coord { index: 0, local: 0 });
        assert_eq!(geometry.locate(63), Coord { index: 0, local: 63 });
        assert_eq!(geometry.locate(64), Coord { index: 1, local: 0 });
        assert_eq!(geometry.locate(200), Coord { index: 3, local: 8 });
        assert_eq!(geometry.locate(256).index, 4);
        assert_eq!(geometry.capacity(), 256);
    }

    #[test]
    fn buffer_alignment() {
        assert_eq!(Geometry::new(1, 16).unwrap().buffer_layout().align(), 16);
        assert_eq!(Geometry::new(1, 4096).unwrap().buffer_layout().align(), POOL_ALIGN);
        assert_eq!(Geometry::new(1, 0).unwrap().pool_size(), 1);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert_eq!(Geometry::new(0, 64).unwrap_err(), Error::InvalidPoolCount);
        assert_eq!(
            Geometry::new(1, usize::MAX).unwrap_err(),
            Error::PoolSizeOverflow
        );
        assert_eq!(
            Geometry::new(usize::MAX / 64, 128).unwrap_err(),
            Error::PoolSizeOverflow
        );
    }

    #[test]
    fn cursor_is_monotonic() {
        let cursor = Cursor::new();
        assert_eq!(cursor.reserve(10), 0);
        assert_eq!(cursor.reserve(5), 10);
        assert_eq!(cursor.get(), 15);
    }

    proptest! {
        #[test]
        fn pool_size_is_next_power_of_two(min in 1usize..=(1 << 40)) {
            let geometry = Geometry::new(1, min).unwrap();
            prop_assert!(geometry.pool_size().is_power_of_two());
            prop_assert!(geometry.pool_size() >= min);
            prop_assert!(geometry.pool_size() / 2 < min);
            prop_assert_eq!(geometry.pool_size(), 1 << geometry.shift);
        }
    }
}
