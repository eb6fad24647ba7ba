//! Fixed-capacity bump allocator backing shader sources and compiled output.
//!
//! The arena is filled front to back and never reclaims memory. Regions are
//! addressed through [`ArenaRegion`] handles rather than references so the
//! whole arena can move between the loader, the compile worker, and the render
//! loop without borrowing gymnastics.

/// Default arena size: enough for one vertex/fragment pair and their output.
pub const DEFAULT_ARENA_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error(
        "arena capacity exceeded: requested {requested} bytes with {remaining} of {capacity} remaining"
    )]
    CapacityExceeded {
        requested: usize,
        remaining: usize,
        capacity: usize,
    },
}

/// Handle to a region previously carved out of an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaRegion {
    offset: usize,
    len: usize,
}

impl ArenaRegion {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte covered by the region.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Debug)]
pub struct Arena {
    storage: Box<[u8]>,
    top: usize,
}

impl Arena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            top: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes handed out so far. Never decreases.
    pub fn used(&self) -> usize {
        self.top
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.top
    }

    /// Reserves exactly `size` bytes after every previous allocation.
    ///
    /// A request larger than [`Arena::remaining`] leaves the arena untouched.
    pub fn allocate(&mut self, size: usize) -> Result<ArenaRegion, ArenaError> {
        if size > self.remaining() {
            return Err(ArenaError::CapacityExceeded {
                requested: size,
                remaining: self.remaining(),
                capacity: self.capacity(),
            });
        }
        let region = ArenaRegion {
            offset: self.top,
            len: size,
        };
        self.top += size;
        Ok(region)
    }

    /// Allocates a region sized to `bytes` and copies them in.
    pub fn allocate_copy(&mut self, bytes: &[u8]) -> Result<ArenaRegion, ArenaError> {
        let region = self.allocate(bytes.len())?;
        self.bytes_mut(region).copy_from_slice(bytes);
        Ok(region)
    }

    pub fn bytes(&self, region: ArenaRegion) -> &[u8] {
        &self.storage[region.offset..region.end()]
    }

    pub fn bytes_mut(&mut self, region: ArenaRegion) -> &mut [u8] {
        &mut self.storage[region.offset..region.end()]
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_follow_allocation_order_without_overlap() {
        let mut arena = Arena::with_capacity(64);
        let sizes = [7, 0, 16, 1, 40];
        let regions: Vec<_> = sizes
            .iter()
            .map(|&size| arena.allocate(size).unwrap())
            .collect();

        for (region, &size) in regions.iter().zip(&sizes) {
            assert_eq!(region.len(), size);
        }
        for pair in regions.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset());
        }
        assert_eq!(arena.used(), 64);
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn oversized_request_is_rejected_and_leaves_offset_alone() {
        let mut arena = Arena::with_capacity(32);
        arena.allocate(30).unwrap();

        let err = arena.allocate(3).unwrap_err();
        assert_eq!(
            err,
            ArenaError::CapacityExceeded {
                requested: 3,
                remaining: 2,
                capacity: 32,
            }
        );
        assert_eq!(arena.used(), 30);

        let tail = arena.allocate(2).unwrap();
        assert_eq!(tail.offset(), 30);
        assert!(arena.allocate(1).is_err());
        assert!(arena.allocate(0).is_ok());
    }

    #[test]
    fn writes_stay_inside_their_region() {
        let mut arena = Arena::with_capacity(16);
        let first = arena.allocate_copy(b"abcd").unwrap();
        let second = arena.allocate(4).unwrap();
        arena.bytes_mut(second).fill(0xff);

        assert_eq!(arena.bytes(first), b"abcd");
        assert_eq!(arena.bytes(second), &[0xff; 4]);
    }
}
