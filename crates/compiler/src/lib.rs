//! Bytecode assembly: a [`ProgramBuilder`] for emitting images from code
//! and a line-oriented text assembler on top of it.

pub mod asm;
pub use asm::assemble;

pub mod builder;
pub use builder::ProgramBuilder;

pub mod error;
pub use error::AssembleError;
