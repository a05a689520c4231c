//! Process registry, dispatcher and lifecycle owner.
//!
//! The kernel owns the arena and the worker pool. It is shared as
//! `Arc<Kernel>` with the worker threads; nothing here is global.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use storage::Storage;
use tracing::{debug, error, info, warn};
use types::ProcessId;
use vm::{Arena, ExecutionError, ProcessHost, ProgramImage};

use crate::config::KernelConfig;
use crate::console::Console;
use crate::error::KernelError;
use crate::process::Process;
use crate::worker::Worker;

#[derive(Debug)]
pub struct Kernel {
    config: KernelConfig,
    arena: Arc<Arena>,
    registry: Mutex<HashMap<ProcessId, Arc<Process>>>,
    next_id: Mutex<u32>,
    workers: Vec<Arc<Worker>>,
    keep_alive: AtomicBool,
    storage: Option<Storage>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Kernel {
    /// Build a kernel without starting any threads. Passes can be driven
    /// from the caller with [`Kernel::run_pass`], or the pool started later
    /// with [`Kernel::start`].
    pub fn new(config: KernelConfig) -> Result<Arc<Self>, KernelError> {
        let arena = Arc::new(Arena::with_limit(config.arena_bytes, config.max_arena_bytes));
        let storage = config.storage_root.as_ref().map(Storage::open).transpose()?;
        let worker_priority = config.worker_priority();
        let workers = (0..config.workers.max(1))
            .map(|index| Arc::new(Worker::new(index, worker_priority)))
            .collect::<Vec<_>>();

        info!(
            arena_bytes = config.arena_bytes,
            workers = workers.len(),
            worker_priority,
            "kernel created"
        );

        Ok(Arc::new(Self {
            config,
            arena,
            registry: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
            workers,
            keep_alive: AtomicBool::new(true),
            storage,
            threads: Mutex::new(Vec::new()),
        }))
    }

    /// Spawn one thread per worker. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), KernelError> {
        let mut threads = self.threads.lock();
        if !threads.is_empty() {
            return Ok(());
        }
        self.keep_alive.store(true, Ordering::Release);

        for worker in &self.workers {
            let kernel = Arc::clone(self);
            let worker = Arc::clone(worker);
            let handle = thread::Builder::new()
                .name(format!("kernel-worker-{}", worker.index()))
                .spawn(move || worker.run(&kernel))?;
            threads.push(handle);
        }
        info!(workers = threads.len(), "kernel started");
        Ok(())
    }

    /// Halt every worker and process, stop the threads and wait for them.
    pub fn shutdown(&self) {
        info!("kernel shutting down");
        self.keep_alive.store(false, Ordering::Release);
        for worker in &self.workers {
            worker.halt(self);
        }

        let leftover: Vec<ProcessId> = self.registry.lock().keys().copied().collect();
        for id in leftover {
            if let Err(err) = self.halt_process_recursive(id) {
                debug!(pid = %id, %err, "already halted during shutdown");
            }
        }

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.threads.lock());
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("kernel stopped");
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    pub fn console(&self) -> &Arc<dyn Console> {
        &self.config.console
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub fn process(&self, id: ProcessId) -> Option<Arc<Process>> {
        self.registry.lock().get(&id).cloned()
    }

    pub fn process_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Create and register a process, recording it as a child of `parent`.
    pub fn generate_process(&self, parent: Option<ProcessId>) -> Result<Arc<Process>, KernelError> {
        let parent = parent
            .map(|id| self.process(id).ok_or(KernelError::UnknownProcess(id)))
            .transpose()?;

        let id = {
            let mut next = self.next_id.lock();
            if *next >= self.config.max_processes {
                error!(limit = self.config.max_processes, "process limit reached");
                return Err(KernelError::ProcessLimit {
                    limit: self.config.max_processes,
                });
            }
            let id = ProcessId::new(*next);
            *next += 1;
            id
        };

        let region = self.config.heap_bytes.saturating_add(self.config.stack_bytes);
        if let Err(err) = self.arena.reserve(region) {
            debug!(pid = %id, %err, "arena could not grow for new process");
        }
        let process = Arc::new(Process::new(
            id,
            Arc::clone(&self.arena),
            self.config.heap_bytes,
            self.config.stack_bytes,
        )?);

        // The parent check, the child link and the insert happen under one
        // registry lock so a concurrent subtree halt either sees the child
        // or makes this call fail.
        {
            let mut registry = self.registry.lock();
            if let Some(parent) = &parent {
                if !registry.contains_key(&parent.id()) {
                    drop(registry);
                    process.release();
                    return Err(KernelError::UnknownProcess(parent.id()));
                }
                parent.add_child(id);
            }
            registry.insert(id, Arc::clone(&process));
        }
        info!(pid = %id, parent = ?parent.as_ref().map(|p| p.id()), "process created");
        Ok(process)
    }

    /// Hand a process to the awake worker with the fewest active processes,
    /// lowest index first on ties. Returns the chosen worker index.
    ///
    /// The registry lock is held until the process is assigned, so a halt
    /// cannot slip in between the lookup and the assignment.
    pub fn execute_process(&self, id: ProcessId) -> Result<usize, KernelError> {
        let registry = self.registry.lock();
        let process = registry.get(&id).cloned().ok_or(KernelError::UnknownProcess(id))?;

        let worker = self
            .workers
            .iter()
            .filter(|w| w.is_awake())
            .min_by_key(|w| (w.active_processes(), w.index()))
            .ok_or(KernelError::NoWorkerAvailable)?;

        for other in &self.workers {
            if other.index() != worker.index() {
                other.remove(id);
            }
        }
        worker.assign(process);
        drop(registry);
        debug!(pid = %id, worker = worker.index(), "process dispatched");
        Ok(worker.index())
    }

    /// Remove a process from every worker and the registry and release its
    /// resources. Children are left running.
    pub fn halt_process(&self, id: ProcessId) -> Result<(), KernelError> {
        let process = self.unregister(id).ok_or_else(|| {
            error!(pid = %id, "halt of unknown process");
            KernelError::UnknownProcess(id)
        })?;
        process.release();
        Ok(())
    }

    /// Halt a process and its whole subtree. Every process in the subtree is
    /// hung and unregistered first, then released children-first. Children
    /// that are already gone are skipped.
    pub fn halt_process_recursive(&self, id: ProcessId) -> Result<(), KernelError> {
        let root = self.unregister(id).ok_or_else(|| {
            error!(pid = %id, "recursive halt of unknown process");
            KernelError::UnknownProcess(id)
        })?;
        root.hang();

        let mut pending = vec![(root, false)];
        let mut halted = 0usize;
        while let Some((process, expanded)) = pending.pop() {
            if expanded {
                process.release();
                halted += 1;
                continue;
            }
            // Read only after `process` left the registry, so the list is final.
            let children = process.children();
            pending.push((process, true));
            for child in children.into_iter().rev() {
                if let Some(child) = self.unregister(child) {
                    child.hang();
                    pending.push((child, false));
                }
            }
        }
        info!(pid = %id, halted, "subtree halted");
        Ok(())
    }

    /// Drop `id` from the registry and every worker under the registry
    /// lock. Once this returns, no new child can be linked to `id`.
    fn unregister(&self, id: ProcessId) -> Option<Arc<Process>> {
        let mut registry = self.registry.lock();
        let process = registry.remove(&id)?;
        for worker in &self.workers {
            worker.remove(id);
        }
        Some(process)
    }

    /// Run one scheduling pass on every awake worker from the calling
    /// thread. Returns how many processes ran.
    pub fn run_pass(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.is_awake())
            .map(|w| w.run_pass(self))
            .sum()
    }

    /// Drive passes from the calling thread until nothing runs or
    /// `max_passes` is reached. Returns the number of passes made.
    pub fn run_until_idle(&self, max_passes: usize) -> usize {
        for pass in 0..max_passes {
            if self.run_pass() == 0 {
                return pass;
            }
        }
        warn!(max_passes, "processes still runnable after pass limit");
        max_passes
    }
}

impl ProcessHost for Kernel {
    fn spawn(&self, parent: ProcessId, priority: u32, name: Vec<u8>) -> Result<ProcessId, ExecutionError> {
        let child = self.generate_process(Some(parent))?;
        child.set_priority(priority);
        child.set_name(name);
        Ok(child.id())
    }

    fn bind_image(&self, target: ProcessId, image: ProgramImage) -> Result<(), ExecutionError> {
        let process = self.process(target).ok_or(ExecutionError::UnknownProcess(target))?;
        process.bind_image(image)?;
        Ok(())
    }

    fn dispatch(&self, target: ProcessId) -> Result<(), ExecutionError> {
        self.execute_process(target)?;
        Ok(())
    }

    fn print(&self, origin: ProcessId, text: &str) {
        self.config.console.print(origin, text);
    }
}
