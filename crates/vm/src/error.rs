use thiserror::Error;
use types::{Addr, ProcessId};

use crate::opcode::Opcode;

/// Allocation and addressing failures raised by the arena and the heaps
/// carved out of it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No single free block is large enough. Total free space may still
    /// exceed the request when the free list is fragmented.
    #[error("cannot allocate {requested} bytes: largest free block is {largest} bytes")]
    OutOfMemory { requested: u32, largest: u32 },

    #[error("zero-sized allocation")]
    ZeroSize,

    /// `calloc` asked to clear more bytes than it allocated.
    #[error("cannot clear {len} bytes of a {size} byte allocation")]
    InvalidLength { size: u32, len: u32 },

    #[error("{0} is not a live allocation")]
    InvalidPointer(Addr),

    #[error("access of {len} bytes at {addr} is out of bounds")]
    OutOfBounds { addr: Addr, len: u32 },

    #[error("arena cannot grow to {requested} bytes (limit {limit})")]
    GrowthLimit { requested: u64, limit: u32 },
}

/// Faults raised while interpreting a program. Any of these terminates the
/// offending process subtree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("call frame overflow (max {max})")]
    FrameOverflow { max: u32 },

    #[error("call frame underflow")]
    FrameUnderflow,

    #[error("frame local {index} out of range")]
    InvalidLocal { index: u32 },

    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u32 },

    #[error("truncated operand for {opcode:?} at offset {offset}")]
    UnexpectedEnd { opcode: Opcode, offset: u32 },

    #[error("division by zero at offset {offset}")]
    DivisionByZero { offset: u32 },

    #[error("jump target {target} outside program of {len} bytes")]
    InvalidJump { target: i64, len: u32 },

    #[error("call to 0x{address:06x} (tag {tag}) outside program of {len} bytes")]
    InvalidCall { tag: u8, address: u32, len: u32 },

    #[error("{0} is not a valid process id")]
    InvalidProcessId(i64),

    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    #[error("process {0} already has a program bound")]
    AlreadyBound(ProcessId),

    #[error("host rejected request: {0}")]
    Host(String),
}
