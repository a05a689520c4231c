use std::fmt::Debug;

use types::ProcessId;

use crate::error::ExecutionError;
use crate::image::ProgramImage;

/// Services the interpreter needs from whoever owns the process table.
///
/// The interpreter never touches other processes directly; creating,
/// binding and dispatching them goes through this seam.
pub trait ProcessHost: Debug {
    /// Create a child of `parent` and return its id.
    fn spawn(&self, parent: ProcessId, priority: u32, name: Vec<u8>) -> Result<ProcessId, ExecutionError>;

    /// Bind `image` to `target`. Fails when `target` already has a program.
    fn bind_image(&self, target: ProcessId, image: ProgramImage) -> Result<(), ExecutionError>;

    /// Hand `target` to a worker.
    fn dispatch(&self, target: ProcessId) -> Result<(), ExecutionError>;

    /// Diagnostic output produced by `PRINT`.
    fn print(&self, origin: ProcessId, text: &str);
}
