use std::collections::BTreeMap;

use types::Addr;

use crate::error::MemoryError;

/// Allocation bookkeeping shared by the arena and the per-process heaps.
///
/// `allocated` maps a block start to its size. `available` maps a free
/// block start to its exclusive end. Together they partition the managed
/// range, and no two free blocks are ever adjacent.
#[derive(Debug, Clone)]
pub(crate) struct FreeList {
    allocated: BTreeMap<u32, u32>,
    available: BTreeMap<u32, u32>,
}

impl FreeList {
    /// Manage `[start, end)`.
    pub fn new(start: u32, end: u32) -> Self {
        let mut available = BTreeMap::new();
        if end > start {
            available.insert(start, end);
        }
        Self {
            allocated: BTreeMap::new(),
            available,
        }
    }

    /// First fit, lowest address first. The unused remainder of the chosen
    /// block stays free at `start + size`.
    pub fn allocate(&mut self, size: u32) -> Result<u32, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }

        let found = self
            .available
            .iter()
            .find(|(start, end)| **end - **start >= size)
            .map(|(start, end)| (*start, *end));

        let Some((start, end)) = found else {
            return Err(MemoryError::OutOfMemory {
                requested: size,
                largest: self.largest_free(),
            });
        };

        self.available.remove(&start);
        if end - start > size {
            self.available.insert(start + size, end);
        }
        self.allocated.insert(start, size);
        Ok(start)
    }

    /// Return a block to the free list and coalesce. Yields the block size.
    pub fn release(&mut self, start: u32) -> Result<u32, MemoryError> {
        let size = self
            .allocated
            .remove(&start)
            .ok_or(MemoryError::InvalidPointer(Addr::new(start)))?;
        self.insert_free(start, start + size);
        Ok(size)
    }

    /// Add `[start, end)` as free space, e.g. after the backing region grew.
    pub fn extend(&mut self, start: u32, end: u32) {
        if end > start {
            self.insert_free(start, end);
        }
    }

    /// Insert a free range and merge it with the blocks that end where it
    /// starts or start where it ends.
    fn insert_free(&mut self, mut start: u32, mut end: u32) {
        while let Some(next_end) = self.available.remove(&end) {
            end = next_end;
        }
        loop {
            let prev = self
                .available
                .range(..start)
                .next_back()
                .map(|(prev_start, prev_end)| (*prev_start, *prev_end));
            match prev {
                Some((prev_start, prev_end)) if prev_end == start => {
                    self.available.remove(&prev_start);
                    start = prev_start;
                }
                _ => break,
            }
        }
        self.available.insert(start, end);
    }

    pub fn size_of(&self, start: u32) -> Option<u32> {
        self.allocated.get(&start).copied()
    }

    pub fn largest_free(&self) -> u32 {
        self.available
            .iter()
            .map(|(start, end)| end - start)
            .max()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BlockSnapshot {
        BlockSnapshot {
            free: self
                .available
                .iter()
                .map(|(start, end)| (Addr::new(*start), Addr::new(*end)))
                .collect(),
            allocations: self
                .allocated
                .iter()
                .map(|(start, size)| (Addr::new(*start), *size))
                .collect(),
        }
    }
}

/// Point-in-time view of an allocator's tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSnapshot {
    /// Free `[start, end)` ranges, ascending.
    pub free: Vec<(Addr, Addr)>,
    /// Live allocations as `(start, size)`, ascending.
    pub allocations: Vec<(Addr, u32)>,
}

impl BlockSnapshot {
    pub fn free_bytes(&self) -> u64 {
        self.free
            .iter()
            .map(|(start, end)| u64::from(end.get() - start.get()))
            .sum()
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocations.iter().map(|(_, size)| u64::from(*size)).sum()
    }
}
