#![allow(dead_code)]

use std::sync::Arc;

use kernel::{BufferConsole, Kernel, KernelConfig};
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Small arena, one worker with the whole budget, console captured.
pub fn small_config(console: Arc<BufferConsole>) -> KernelConfig {
    KernelConfig::default()
        .with_arena_bytes(1 << 20)
        .with_max_arena_bytes(4 << 20)
        .with_workers(1)
        .with_priority_budget(1000)
        .with_heap_bytes(2048)
        .with_stack_bytes(1024)
        .with_max_processes(64)
        .with_console(console)
}

pub fn test_kernel() -> (Arc<Kernel>, Arc<BufferConsole>) {
    test_kernel_with(|config| config)
}

pub fn test_kernel_with(adjust: impl FnOnce(KernelConfig) -> KernelConfig) -> (Arc<Kernel>, Arc<BufferConsole>) {
    init_tracing();
    let console = Arc::new(BufferConsole::new());
    let kernel = Kernel::new(adjust(small_config(Arc::clone(&console)))).unwrap();
    (kernel, console)
}

/// Number of live arena allocations.
pub fn live_allocations(kernel: &Kernel) -> usize {
    kernel.arena().snapshot().blocks.allocations.len()
}
