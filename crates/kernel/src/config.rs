use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use types::Config;

use crate::console::{Console, StdoutConsole};

/// Runtime settings fixed when a [`crate::Kernel`] is created.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Initial arena size in bytes.
    pub arena_bytes: u32,
    /// Upper bound the arena may grow to when process regions need room.
    pub max_arena_bytes: u32,
    pub workers: usize,
    /// Instruction budget shared by all workers; each gets an equal share.
    pub priority_budget: u32,
    pub heap_bytes: u32,
    pub stack_bytes: u32,
    /// Processes this kernel may ever create.
    pub max_processes: u32,
    /// Directory for the blob store. No storage is attached when unset.
    pub storage_root: Option<PathBuf>,
    pub console: Arc<dyn Console>,
    /// How long a worker parks when it has nothing runnable.
    pub idle_backoff: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            arena_bytes: Config::DEFAULT_ARENA_BYTES,
            max_arena_bytes: Config::DEFAULT_ARENA_BYTES.saturating_mul(4),
            workers: Config::DEFAULT_WORKERS,
            priority_budget: Config::DEFAULT_PRIORITY_BUDGET,
            heap_bytes: Config::DEFAULT_HEAP_BYTES,
            stack_bytes: Config::DEFAULT_STACK_BYTES,
            max_processes: Config::MAX_PROCESSES,
            storage_root: None,
            console: Arc::new(StdoutConsole),
            idle_backoff: Duration::from_millis(5),
        }
    }
}

impl KernelConfig {
    pub fn with_arena_bytes(mut self, bytes: u32) -> Self {
        self.arena_bytes = bytes;
        self.max_arena_bytes = self.max_arena_bytes.max(bytes);
        self
    }

    pub fn with_max_arena_bytes(mut self, bytes: u32) -> Self {
        self.max_arena_bytes = bytes.max(self.arena_bytes);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_priority_budget(mut self, budget: u32) -> Self {
        self.priority_budget = budget;
        self
    }

    pub fn with_heap_bytes(mut self, bytes: u32) -> Self {
        self.heap_bytes = bytes;
        self
    }

    pub fn with_stack_bytes(mut self, bytes: u32) -> Self {
        self.stack_bytes = bytes;
        self
    }

    pub fn with_max_processes(mut self, max: u32) -> Self {
        self.max_processes = max.min(Config::MAX_PROCESSES);
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Budget each worker starts with.
    pub fn worker_priority(&self) -> u32 {
        self.priority_budget / self.workers.max(1) as u32
    }
}
