//! Interpreter operand stack and call frames.
//!
//! Operands are 8-byte big-endian slots in an arena block. The block grows
//! by [`Config::STACK_GROW_BYTES`] once fewer than [`GROW_HEADROOM`] bytes
//! remain, and shrinks by the same amount once more than two increments sit
//! unused, never below its initial size. The gap between the two thresholds
//! keeps alternating push/pop from resizing on every instruction.
//!
//! Frames live in a second, bounded arena block that is only allocated on
//! the first [`Stack::push_frame`]. Each frame record is a return cursor
//! followed by [`Config::FRAME_LOCALS`] local slots.

use std::sync::Arc;

use tracing::{debug, warn};
use types::{Addr, Config};

use crate::arena::Arena;
use crate::error::{ExecutionError, MemoryError};

const SLOT: u32 = Config::SLOT_BYTES;
const GROW: u32 = Config::STACK_GROW_BYTES;

/// Headroom below which a push grows the operand region.
pub const GROW_HEADROOM: u32 = 32;

#[derive(Debug)]
pub struct Stack {
    arena: Arc<Arena>,
    base: Addr,
    size: u32,
    initial_size: u32,
    index: u32,
    frames: Option<Addr>,
    frame_depth: u32,
}

impl Stack {
    pub fn new(arena: Arc<Arena>, size: u32) -> Result<Self, MemoryError> {
        let size = size.max(GROW_HEADROOM + SLOT);
        let base = arena.allocate(size)?;
        Ok(Self {
            arena,
            base,
            size,
            initial_size: size,
            index: 0,
            frames: None,
            frame_depth: 0,
        })
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        (self.index / SLOT) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    /// Bytes currently backing the operand region.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn initial_size(&self) -> u32 {
        self.initial_size
    }

    fn slot(&self, index: u32) -> Result<Addr, MemoryError> {
        self.base
            .checked_add(index)
            .ok_or(MemoryError::OutOfBounds { addr: self.base, len: index })
    }

    fn resize(&mut self, new_size: u32) -> Result<(), MemoryError> {
        if new_size > self.size {
            self.arena.reserve(new_size)?;
        }
        let moved = self.arena.try_reallocate(self.base, new_size)?;
        self.arena.free(self.base)?;
        debug!(from = %self.base, to = %moved, old_size = self.size, new_size, "stack resized");
        self.base = moved;
        self.size = new_size;
        Ok(())
    }

    pub fn push(&mut self, value: i64) -> Result<(), ExecutionError> {
        if self.index + SLOT > self.size {
            self.resize(self.size + GROW)?;
        }
        self.arena.set_i64(self.slot(self.index)?, value)?;
        self.index += SLOT;

        if self.size - self.index < GROW_HEADROOM {
            if let Err(err) = self.resize(self.size + GROW) {
                debug!(%err, "stack growth deferred");
            }
        }
        Ok(())
    }

    pub fn pop(&mut self) -> Result<i64, ExecutionError> {
        if self.index < SLOT {
            return Err(ExecutionError::StackUnderflow);
        }
        self.index -= SLOT;
        let value = self.arena.get_i64(self.slot(self.index)?)?;

        if self.size > self.index + 2 * GROW && self.size - GROW >= self.initial_size {
            if let Err(err) = self.resize(self.size - GROW) {
                debug!(%err, "stack shrink deferred");
            }
        }
        Ok(value)
    }

    pub fn peek(&self) -> Result<i64, ExecutionError> {
        if self.index < SLOT {
            return Err(ExecutionError::StackUnderflow);
        }
        Ok(self.arena.get_i64(self.slot(self.index - SLOT)?)?)
    }

    /// Live slots, bottom first.
    pub fn snapshot(&self) -> Vec<i64> {
        (0..self.index / SLOT)
            .filter_map(|i| self.slot(i * SLOT).ok())
            .filter_map(|addr| self.arena.get_i64(addr).ok())
            .collect()
    }

    pub fn frame_depth(&self) -> u32 {
        self.frame_depth
    }

    fn frame_region(&mut self) -> Result<Addr, MemoryError> {
        match self.frames {
            Some(addr) => Ok(addr),
            None => {
                let addr = self.arena.allocate(Config::MAX_FRAMES * Config::FRAME_BYTES)?;
                self.frames = Some(addr);
                Ok(addr)
            }
        }
    }

    fn frame_slot(&self, depth: u32, slot: u32) -> Result<Addr, ExecutionError> {
        let region = self.frames.ok_or(ExecutionError::FrameUnderflow)?;
        let offset = depth * Config::FRAME_BYTES + slot * SLOT;
        Ok(region
            .checked_add(offset)
            .ok_or(MemoryError::OutOfBounds { addr: region, len: offset })?)
    }

    /// Open a frame that returns to `return_cursor` with zeroed locals.
    pub fn push_frame(&mut self, return_cursor: u32) -> Result<(), ExecutionError> {
        if self.frame_depth >= Config::MAX_FRAMES {
            return Err(ExecutionError::FrameOverflow {
                max: Config::MAX_FRAMES,
            });
        }
        self.frame_region()?;
        let record = self.frame_slot(self.frame_depth, 0)?;
        self.arena.write_bytes(record, &[0; Config::FRAME_BYTES as usize])?;
        self.arena.set_i64(record, i64::from(return_cursor))?;
        self.frame_depth += 1;
        Ok(())
    }

    pub fn peek_frame(&self) -> Result<u32, ExecutionError> {
        let depth = self
            .frame_depth
            .checked_sub(1)
            .ok_or(ExecutionError::FrameUnderflow)?;
        let cursor = self.arena.get_i64(self.frame_slot(depth, 0)?)?;
        Ok(cursor as u32)
    }

    pub fn pop_frame(&mut self) -> Result<u32, ExecutionError> {
        let cursor = self.peek_frame()?;
        self.frame_depth -= 1;
        Ok(cursor)
    }

    fn local_slot(&self, index: u32) -> Result<Addr, ExecutionError> {
        if index >= Config::FRAME_LOCALS {
            return Err(ExecutionError::InvalidLocal { index });
        }
        let depth = self
            .frame_depth
            .checked_sub(1)
            .ok_or(ExecutionError::FrameUnderflow)?;
        self.frame_slot(depth, 1 + index)
    }

    pub fn local(&self, index: u32) -> Result<i64, ExecutionError> {
        Ok(self.arena.get_i64(self.local_slot(index)?)?)
    }

    pub fn set_local(&mut self, index: u32, value: i64) -> Result<(), ExecutionError> {
        Ok(self.arena.set_i64(self.local_slot(index)?, value)?)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        for addr in std::iter::once(self.base).chain(self.frames) {
            if let Err(err) = self.arena.free(addr) {
                warn!(%addr, %err, "stack region already released");
            }
        }
    }
}
