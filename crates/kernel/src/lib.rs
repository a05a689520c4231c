//! Multi-worker process kernel.
//!
//! A [`Kernel`] owns one memory arena, a registry of [`Process`]es and a
//! fixed pool of [`Worker`]s. Workers run weighted round-robin passes over
//! the processes dispatched to them; each quantum drives the bytecode
//! interpreter from the `vm` crate against the process's private heap and
//! stack.

pub mod config;
pub use config::KernelConfig;

pub mod console;
pub use console::{BufferConsole, Console, StdoutConsole};

pub mod error;
pub use error::KernelError;

pub mod kernel;
pub use kernel::Kernel;

pub mod process;
pub use process::{Process, Quantum, Rank};

pub mod worker;
pub use worker::{Worker, fairness_order};
