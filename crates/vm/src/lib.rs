//! Memory and execution core: the arena allocator, per-process heaps and
//! stacks, program images and the bytecode interpreter.

pub mod arena;
pub mod error;
mod free_list;
pub mod heap;
pub mod host;
pub mod image;
pub mod interpreter;
pub mod opcode;
pub mod stack;

pub use arena::{Arena, ArenaSnapshot};
pub use error::{ExecutionError, MemoryError};
pub use free_list::BlockSnapshot;
pub use heap::Heap;
pub use host::ProcessHost;
pub use image::ProgramImage;
pub use interpreter::{Interpreter, StepOutcome};
pub use opcode::Opcode;
pub use stack::Stack;
