//! Per-process private heap.
//!
//! A heap is a single arena allocation with its own nested free list.
//! Logical addresses start at 1 so that 0 stays null inside the heap as
//! well; logical `a` lives at physical `base + (a - 1)`.
//!
//! Accesses outside the heap region are soft faults: reads yield zero and
//! writes are dropped. Buggy bytecode degrades instead of crashing the
//! worker that runs it.

use std::sync::Arc;

use tracing::{debug, warn};
use types::Addr;

use crate::arena::Arena;
use crate::error::MemoryError;
use crate::free_list::{BlockSnapshot, FreeList};

#[derive(Debug)]
pub struct Heap {
    arena: Arc<Arena>,
    base: Addr,
    size: u32,
    blocks: FreeList,
}

impl Heap {
    pub fn new(arena: Arc<Arena>, size: u32) -> Result<Self, MemoryError> {
        let base = arena.allocate(size)?;
        Ok(Self {
            arena,
            base,
            size,
            blocks: FreeList::new(1, size + 1),
        })
    }

    /// Physical arena address of the heap region.
    pub fn base(&self) -> Addr {
        self.base
    }

    /// Current size of the heap region in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    fn fix_address(&self, addr: Addr, len: u32) -> Option<Addr> {
        let offset = addr.get().checked_sub(1)?;
        let end = u64::from(offset) + u64::from(len);
        if end > u64::from(self.size) {
            return None;
        }
        self.base.checked_add(offset)
    }

    /// Grow the region when no free block can hold `size` bytes. Growing
    /// moves the region to a new arena block; the new tail becomes free.
    fn reserve(&mut self, size: u32) {
        if self.blocks.largest_free() >= size {
            return;
        }
        let Some(grown) = self.size.checked_add(size) else {
            return;
        };
        if let Err(err) = self.arena.reserve(grown) {
            debug!(%err, "arena could not make room for heap growth");
        }
        let moved = match self.arena.try_reallocate(self.base, grown) {
            Ok(moved) => moved,
            Err(err) => {
                debug!(base = %self.base, size, %err, "heap growth refused");
                return;
            }
        };
        if let Err(err) = self.arena.free(self.base) {
            warn!(base = %self.base, %err, "heap could not release its previous region");
        }
        self.blocks.extend(self.size + 1, grown + 1);
        debug!(from = %self.base, to = %moved, old_size = self.size, new_size = grown, "heap grew");
        self.base = moved;
        self.size = grown;
    }

    pub fn malloc(&mut self, size: u32) -> Result<Addr, MemoryError> {
        self.reserve(size);
        self.blocks.allocate(size).map(Addr::new)
    }

    pub fn calloc(&mut self, size: u32, len: u32) -> Result<Addr, MemoryError> {
        if len > size {
            return Err(MemoryError::InvalidLength { size, len });
        }
        let addr = self.malloc(size)?;
        if let Some(phys) = self.fix_address(addr, len) {
            self.arena.write_bytes(phys, &vec![0; len as usize])?;
        }
        Ok(addr)
    }

    pub fn free(&mut self, addr: Addr) -> Result<(), MemoryError> {
        self.blocks.release(addr.get()).map(|_| ())
    }

    pub fn size_of(&self, addr: Addr) -> Result<u32, MemoryError> {
        self.blocks
            .size_of(addr.get())
            .ok_or(MemoryError::InvalidPointer(addr))
    }

    fn soft_read<T: Default>(&self, addr: Addr, len: u32, read: impl FnOnce(Addr) -> Result<T, MemoryError>) -> T {
        match self.fix_address(addr, len).map(read) {
            Some(Ok(value)) => value,
            _ => {
                warn!(%addr, len, heap_size = self.size, "heap read out of range, yielding zero");
                T::default()
            }
        }
    }

    fn soft_write(&self, addr: Addr, len: u32, write: impl FnOnce(Addr) -> Result<(), MemoryError>) {
        let written = self.fix_address(addr, len).map(write);
        if !matches!(written, Some(Ok(()))) {
            warn!(%addr, len, heap_size = self.size, "heap write out of range, dropped");
        }
    }

    pub fn get_u8(&self, addr: Addr) -> u8 {
        self.soft_read(addr, 1, |p| self.arena.get_u8(p))
    }

    pub fn get_i16(&self, addr: Addr) -> i16 {
        self.soft_read(addr, 2, |p| self.arena.get_i16(p))
    }

    pub fn get_i32(&self, addr: Addr) -> i32 {
        self.soft_read(addr, 4, |p| self.arena.get_i32(p))
    }

    pub fn get_i64(&self, addr: Addr) -> i64 {
        self.soft_read(addr, 8, |p| self.arena.get_i64(p))
    }

    pub fn set_u8(&self, addr: Addr, value: u8) {
        self.soft_write(addr, 1, |p| self.arena.set_u8(p, value))
    }

    pub fn set_i16(&self, addr: Addr, value: i16) {
        self.soft_write(addr, 2, |p| self.arena.set_i16(p, value))
    }

    pub fn set_i32(&self, addr: Addr, value: i32) {
        self.soft_write(addr, 4, |p| self.arena.set_i32(p, value))
    }

    pub fn set_i64(&self, addr: Addr, value: i64) {
        self.soft_write(addr, 8, |p| self.arena.set_i64(p, value))
    }

    /// Copy `len` bytes from a physical arena address into the heap.
    pub fn write_from_arena(&self, dst: Addr, src: Addr, len: u32) -> Result<(), MemoryError> {
        let phys = self
            .fix_address(dst, len)
            .ok_or(MemoryError::OutOfBounds { addr: dst, len })?;
        self.arena.copy(phys, src, len)
    }

    /// Bytes of the allocation starting at `addr`.
    pub fn read_array(&self, addr: Addr) -> Result<Vec<u8>, MemoryError> {
        let len = self.size_of(addr)?;
        let phys = self
            .fix_address(addr, len)
            .ok_or(MemoryError::OutOfBounds { addr, len })?;
        self.arena.read_bytes(phys, len)
    }

    pub fn snapshot(&self) -> BlockSnapshot {
        self.blocks.snapshot()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if let Err(err) = self.arena.free(self.base) {
            warn!(base = %self.base, %err, "heap region already released");
        }
    }
}
