use thiserror::Error;
use types::ProcessId;
use vm::{ExecutionError, MemoryError};

#[derive(Debug, Error)]
pub enum KernelError {
    /// The lifetime process cap was reached. Not recoverable for this kernel.
    #[error("process limit of {limit} reached")]
    ProcessLimit { limit: u32 },

    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    #[error("process {0} already has a program bound")]
    AlreadyBound(ProcessId),

    #[error("process {0} has been halted")]
    Halted(ProcessId),

    #[error("no awake worker to dispatch to")]
    NoWorkerAvailable,

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    #[error("failed to spawn worker thread: {0}")]
    Thread(#[from] std::io::Error),
}

impl From<KernelError> for ExecutionError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::UnknownProcess(id) | KernelError::Halted(id) => ExecutionError::UnknownProcess(id),
            KernelError::AlreadyBound(id) => ExecutionError::AlreadyBound(id),
            KernelError::Memory(err) => ExecutionError::Memory(err),
            other => ExecutionError::Host(other.to_string()),
        }
    }
}
