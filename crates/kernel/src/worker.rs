//! Worker threads and the weighted round-robin pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, Thread};

use parking_lot::Mutex;
use tracing::{debug, info, trace};
use types::ProcessId;

use crate::kernel::Kernel;
use crate::process::{Process, Quantum};

/// One scheduling thread and the processes it currently owns.
#[derive(Debug)]
pub struct Worker {
    index: usize,
    priority: AtomicU32,
    active: AtomicBool,
    processes: Mutex<Vec<Arc<Process>>>,
    thread: Mutex<Option<Thread>>,
}

impl Worker {
    pub(crate) fn new(index: usize, priority: u32) -> Self {
        Self {
            index,
            priority: AtomicU32::new(priority),
            active: AtomicBool::new(true),
            processes: Mutex::new(Vec::new()),
            thread: Mutex::new(None),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Instructions this worker hands out per pass.
    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_priority(&self, priority: u32) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn is_awake(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop running passes and stop accepting dispatches. Owned processes
    /// stay assigned.
    pub fn hang(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn wake(&self) {
        self.active.store(true, Ordering::Release);
        self.unpark();
    }

    /// Owned processes that have work to do.
    pub fn active_processes(&self) -> usize {
        self.processes.lock().iter().filter(|p| !p.is_idle()).count()
    }

    pub fn is_idle(&self) -> bool {
        self.active_processes() == 0
    }

    pub fn process_ids(&self) -> Vec<ProcessId> {
        self.processes.lock().iter().map(|p| p.id()).collect()
    }

    pub(crate) fn assign(&self, process: Arc<Process>) {
        {
            let mut processes = self.processes.lock();
            if !processes.iter().any(|p| p.id() == process.id()) {
                processes.push(process);
            }
        }
        self.unpark();
    }

    pub(crate) fn remove(&self, id: ProcessId) -> bool {
        let mut processes = self.processes.lock();
        let before = processes.len();
        processes.retain(|p| p.id() != id);
        processes.len() != before
    }

    fn unpark(&self) {
        if let Some(thread) = self.thread.lock().as_ref() {
            thread.unpark();
        }
    }

    /// One scheduling pass. Idle processes are ticked; runnable ones run in
    /// fairness order, each granted `budget * priority / 100` instructions
    /// capped by what is left of the budget. A process whose grant rounds
    /// down to zero is only ticked. Returns how many processes actually ran.
    pub fn run_pass(&self, kernel: &Kernel) -> usize {
        let owned: Vec<Arc<Process>> = self.processes.lock().clone();
        let (idle, runnable): (Vec<_>, Vec<_>) = owned.into_iter().partition(|p| p.is_idle());
        for process in &idle {
            process.tick();
        }

        let budget = self.priority();
        let mut remaining = budget;
        let mut ran = 0;
        for process in fairness_order(runnable) {
            if remaining == 0 {
                break;
            }
            let share = u64::from(budget) * u64::from(process.priority()) / 100;
            let grant = share.min(u64::from(remaining)) as u32;
            if grant == 0 {
                // Weight too small for any instruction this pass.
                process.tick();
                continue;
            }
            remaining -= grant;

            trace!(worker = self.index, pid = %process.id(), grant, remaining, "grant");
            if process.execute(kernel, grant) != Quantum::Idle {
                ran += 1;
            }
        }
        ran
    }

    /// Thread body: run passes while the kernel is alive, parking when there
    /// is nothing to do.
    pub(crate) fn run(&self, kernel: &Kernel) {
        *self.thread.lock() = Some(thread::current());
        info!(worker = self.index, priority = self.priority(), "worker started");

        while kernel.keep_alive() {
            let ran = if self.is_awake() { self.run_pass(kernel) } else { 0 };
            if ran == 0 {
                thread::park_timeout(kernel.config().idle_backoff);
            }
        }

        *self.thread.lock() = None;
        info!(worker = self.index, "worker stopped");
    }

    /// Hang the worker and halt every process it owns, subtree included.
    pub(crate) fn halt(&self, kernel: &Kernel) {
        self.hang();
        let owned = std::mem::take(&mut *self.processes.lock());
        for process in owned {
            if let Err(err) = kernel.halt_process_recursive(process.id()) {
                debug!(worker = self.index, pid = %process.id(), %err, "already halted");
            }
        }
        self.unpark();
    }
}

/// Order processes by [`crate::Rank::schedules_before`]. The relation is not
/// transitive once the starvation override kicks in, so this repeatedly
/// picks a winner instead of sorting.
pub fn fairness_order(processes: Vec<Arc<Process>>) -> Vec<Arc<Process>> {
    let mut pending: Vec<_> = processes.into_iter().map(|p| (p.rank(), p)).collect();
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let mut best = 0;
        for i in 1..pending.len() {
            if pending[i].0.schedules_before(&pending[best].0) {
                best = i;
            }
        }
        ordered.push(pending.remove(best).1);
    }
    ordered
}
