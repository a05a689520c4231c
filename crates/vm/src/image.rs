use std::sync::Arc;

use tracing::warn;
use types::Addr;

use crate::arena::Arena;
use crate::error::MemoryError;

/// Immutable bytecode stored in the arena. The block is released when the
/// last image referring to it is dropped.
#[derive(Debug)]
struct ImageBlock {
    arena: Arc<Arena>,
    base: Addr,
    len: u32,
}

impl Drop for ImageBlock {
    fn drop(&mut self) {
        if let Err(err) = self.arena.free(self.base) {
            warn!(base = %self.base, %err, "program image already released");
        }
    }
}

/// A bound program: a shared image block plus the offset execution starts
/// from. Processes spawned onto a function of their parent share the
/// parent's block with a different entry offset.
#[derive(Debug, Clone)]
pub struct ProgramImage {
    block: Arc<ImageBlock>,
    entry: u32,
}

impl ProgramImage {
    /// Copy `bytes` into a fresh arena block.
    pub fn load(arena: Arc<Arena>, bytes: &[u8]) -> Result<Self, MemoryError> {
        let len = u32::try_from(bytes.len()).map_err(|_| MemoryError::OutOfMemory {
            requested: u32::MAX,
            largest: 0,
        })?;
        let base = arena.allocate(len)?;
        if let Err(err) = arena.write_bytes(base, bytes) {
            if let Err(free_err) = arena.free(base) {
                warn!(%base, %free_err, "failed to free image block after a bad load");
            }
            return Err(err);
        }
        Ok(Self {
            block: Arc::new(ImageBlock { arena, base, len }),
            entry: 0,
        })
    }

    /// The same image entered at `entry` instead.
    pub fn with_entry(&self, entry: u32) -> Self {
        Self {
            block: Arc::clone(&self.block),
            entry,
        }
    }

    pub fn base(&self) -> Addr {
        self.block.base
    }

    pub fn len(&self) -> u32 {
        self.block.len
    }

    pub fn is_empty(&self) -> bool {
        self.block.len == 0
    }

    pub fn entry(&self) -> u32 {
        self.entry
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.block.arena
    }

    /// Physical address of `offset` bytes into the image, if in range.
    pub fn address_of(&self, offset: u32) -> Option<Addr> {
        if offset >= self.block.len {
            return None;
        }
        self.block.base.checked_add(offset)
    }
}
