//! The system-wide memory block.
//!
//! One contiguous byte buffer with a first-fit free list. Address `0` is
//! reserved as null, so the usable range is `[1, capacity]` and the buffer
//! carries one extra leading byte that is never handed out.
//!
//! All bounds checks happen here. Heaps, stacks and program images only
//! ever reach the buffer through these methods, under the arena lock.

use parking_lot::Mutex;
use tracing::{debug, warn};
use types::Addr;

use crate::error::MemoryError;
use crate::free_list::{BlockSnapshot, FreeList};

#[derive(Debug)]
struct ArenaInner {
    bytes: Vec<u8>,
    blocks: FreeList,
}

impl ArenaInner {
    fn capacity(&self) -> u32 {
        (self.bytes.len() - 1) as u32
    }

    fn range(&self, addr: Addr, len: u32) -> Result<std::ops::Range<usize>, MemoryError> {
        let end = u64::from(addr.get()) + u64::from(len);
        if addr.is_null() || end > u64::from(self.capacity()) + 1 {
            return Err(MemoryError::OutOfBounds { addr, len });
        }
        Ok(addr.as_usize()..end as usize)
    }

    fn read<const N: usize>(&self, addr: Addr) -> Result<[u8; N], MemoryError> {
        let range = self.range(addr, N as u32)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[range]);
        Ok(out)
    }

    fn write(&mut self, addr: Addr, data: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, data.len() as u32)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn copy(&mut self, dst: Addr, src: Addr, len: u32) -> Result<(), MemoryError> {
        let from = self.range(src, len)?;
        let to = self.range(dst, len)?;
        self.bytes.copy_within(from, to.start);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Arena {
    inner: Mutex<ArenaInner>,
    max_capacity: u32,
}

impl Arena {
    /// Fixed-size arena.
    pub fn new(capacity: u32) -> Self {
        Self::with_limit(capacity, capacity)
    }

    /// Arena that may later grow up to `max_capacity` bytes via [`Arena::reserve`].
    pub fn with_limit(capacity: u32, max_capacity: u32) -> Self {
        let capacity = capacity.min(u32::MAX - 1);
        Self {
            inner: Mutex::new(ArenaInner {
                bytes: vec![0; capacity as usize + 1],
                blocks: FreeList::new(1, capacity + 1),
            }),
            max_capacity: max_capacity.clamp(capacity, u32::MAX - 1),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.inner.lock().capacity()
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    pub fn allocate(&self, size: u32) -> Result<Addr, MemoryError> {
        let addr = self.inner.lock().blocks.allocate(size).map(Addr::new)?;
        debug!(%addr, size, "arena allocate");
        Ok(addr)
    }

    /// Allocate `size` bytes and zero the first `len` of them.
    pub fn calloc(&self, size: u32, len: u32) -> Result<Addr, MemoryError> {
        if len > size {
            return Err(MemoryError::InvalidLength { size, len });
        }
        let mut inner = self.inner.lock();
        let addr = Addr::new(inner.blocks.allocate(size)?);
        let range = inner.range(addr, len)?;
        inner.bytes[range].fill(0);
        Ok(addr)
    }

    /// Move an allocation into a fresh block of `new_size` bytes and return
    /// the new address.
    ///
    /// The old block stays allocated. Callers that no longer need it free it
    /// themselves once they have switched over to the new address.
    pub fn try_reallocate(&self, addr: Addr, new_size: u32) -> Result<Addr, MemoryError> {
        let mut inner = self.inner.lock();
        let old_size = inner
            .blocks
            .size_of(addr.get())
            .ok_or(MemoryError::InvalidPointer(addr))?;
        let moved = Addr::new(inner.blocks.allocate(new_size)?);
        inner.copy(moved, addr, old_size.min(new_size))?;
        debug!(from = %addr, to = %moved, old_size, new_size, "arena reallocate, old block still live");
        Ok(moved)
    }

    /// Best-effort [`Arena::try_reallocate`]: hands back `addr` unchanged
    /// when the move cannot be satisfied.
    #[must_use]
    pub fn reallocate(&self, addr: Addr, new_size: u32) -> Addr {
        match self.try_reallocate(addr, new_size) {
            Ok(moved) => {
                warn!(from = %addr, to = %moved, new_size, "reallocate keeps the old block allocated, free it explicitly");
                moved
            }
            Err(err) => {
                debug!(%addr, new_size, %err, "arena reallocate refused");
                addr
            }
        }
    }

    /// Release a live allocation. Addresses that are not the start of a
    /// live block are rejected and leave the tables untouched.
    pub fn free(&self, addr: Addr) -> Result<(), MemoryError> {
        let size = self.inner.lock().blocks.release(addr.get())?;
        debug!(%addr, size, "arena free");
        Ok(())
    }

    pub fn size_of(&self, addr: Addr) -> Result<u32, MemoryError> {
        self.inner
            .lock()
            .blocks
            .size_of(addr.get())
            .ok_or(MemoryError::InvalidPointer(addr))
    }

    /// Make sure one block of at least `additional` bytes can be allocated,
    /// growing the buffer when the free list cannot satisfy it. Returns
    /// whether the arena actually grew.
    pub fn reserve(&self, additional: u32) -> Result<bool, MemoryError> {
        let mut inner = self.inner.lock();
        if inner.blocks.largest_free() >= additional {
            return Ok(false);
        }

        let old = inner.capacity();
        let requested = u64::from(old) + u64::from(additional);
        if requested > u64::from(self.max_capacity) {
            warn!(capacity = old, requested, limit = self.max_capacity, "arena growth refused");
            return Err(MemoryError::GrowthLimit {
                requested,
                limit: self.max_capacity,
            });
        }

        let grown = old + additional;
        inner.bytes.resize(grown as usize + 1, 0);
        inner.blocks.extend(old + 1, grown + 1);
        debug!(from = old, to = grown, "arena grew");
        Ok(true)
    }

    pub fn get_u8(&self, addr: Addr) -> Result<u8, MemoryError> {
        self.inner.lock().read::<1>(addr).map(|b| b[0])
    }

    pub fn get_i16(&self, addr: Addr) -> Result<i16, MemoryError> {
        self.inner.lock().read(addr).map(i16::from_be_bytes)
    }

    pub fn get_i32(&self, addr: Addr) -> Result<i32, MemoryError> {
        self.inner.lock().read(addr).map(i32::from_be_bytes)
    }

    pub fn get_i64(&self, addr: Addr) -> Result<i64, MemoryError> {
        self.inner.lock().read(addr).map(i64::from_be_bytes)
    }

    pub fn set_u8(&self, addr: Addr, value: u8) -> Result<(), MemoryError> {
        self.inner.lock().write(addr, &[value])
    }

    pub fn set_i16(&self, addr: Addr, value: i16) -> Result<(), MemoryError> {
        self.inner.lock().write(addr, &value.to_be_bytes())
    }

    pub fn set_i32(&self, addr: Addr, value: i32) -> Result<(), MemoryError> {
        self.inner.lock().write(addr, &value.to_be_bytes())
    }

    pub fn set_i64(&self, addr: Addr, value: i64) -> Result<(), MemoryError> {
        self.inner.lock().write(addr, &value.to_be_bytes())
    }

    pub fn read_bytes(&self, addr: Addr, len: u32) -> Result<Vec<u8>, MemoryError> {
        let inner = self.inner.lock();
        let range = inner.range(addr, len)?;
        Ok(inner.bytes[range].to_vec())
    }

    pub fn write_bytes(&self, addr: Addr, data: &[u8]) -> Result<(), MemoryError> {
        self.inner.lock().write(addr, data)
    }

    /// Copy `len` bytes from `src` to `dst`. Overlapping ranges are fine.
    pub fn copy(&self, dst: Addr, src: Addr, len: u32) -> Result<(), MemoryError> {
        self.inner.lock().copy(dst, src, len)
    }

    /// Copy `len` bytes from `src_a` followed by `len` bytes from `src_b`
    /// into `dst`.
    pub fn concat_copy(&self, dst: Addr, src_a: Addr, src_b: Addr, len: u32) -> Result<(), MemoryError> {
        let second = dst
            .checked_add(len)
            .ok_or(MemoryError::OutOfBounds { addr: dst, len })?;
        let mut inner = self.inner.lock();
        inner.range(dst, len.saturating_mul(2))?;
        inner.copy(dst, src_a, len)?;
        inner.copy(second, src_b, len)
    }

    pub fn snapshot(&self) -> ArenaSnapshot {
        let inner = self.inner.lock();
        ArenaSnapshot {
            capacity: inner.capacity(),
            blocks: inner.blocks.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaSnapshot {
    pub capacity: u32,
    pub blocks: BlockSnapshot,
}
