//! One logical unit of execution.
//!
//! A process owns a private heap and stack carved from the kernel arena and,
//! once bound, a program image. Everything is shared as `Arc<Process>`
//! between the registry and the worker that runs it, so all state is behind
//! atomics or locks.
//!
//! The heap, stack and cursor sit under a single lock that is held for the
//! whole of a quantum. Releasing them takes the same lock, so a halt that
//! races with a running quantum waits for it to finish against valid
//! memory.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use types::{Config, ProcessId};
use vm::{Arena, BlockSnapshot, ExecutionError, Heap, Interpreter, ProgramImage, Stack, StepOutcome};

use crate::error::KernelError;
use crate::kernel::Kernel;

#[derive(Debug)]
struct ExecContext {
    heap: Heap,
    stack: Stack,
    /// Offset into the image. `None` until the first quantum, which starts
    /// at the image entry.
    cursor: Option<u32>,
}

/// What a call to [`Process::execute`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quantum {
    /// Nothing ran: no program, hung, or already halted.
    Idle,
    /// The budget ran out.
    Yielded,
    /// The program ran off its end; the process is now hung.
    Finished,
    /// The program executed `HALT`.
    Halted { recursive: bool },
    /// Execution failed and the subtree was halted.
    Faulted(ExecutionError),
}

/// Scheduling inputs captured at one instant, so one ordering pass sees a
/// consistent view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    pub id: ProcessId,
    pub priority: u32,
    pub cycle: u64,
}

impl Rank {
    /// A process more than [`Config::STARVATION_CYCLES`] behind goes first
    /// whatever its weight. Otherwise the higher weight goes first, and the
    /// older process breaks ties.
    pub fn schedules_before(&self, other: &Rank) -> bool {
        if other.cycle > self.cycle.saturating_add(Config::STARVATION_CYCLES) {
            return true;
        }
        if self.cycle > other.cycle.saturating_add(Config::STARVATION_CYCLES) {
            return false;
        }
        match self.priority.cmp(&other.priority) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.id < other.id,
        }
    }
}

#[derive(Debug)]
pub struct Process {
    id: ProcessId,
    arena: Arc<Arena>,
    image: Mutex<Option<ProgramImage>>,
    context: Mutex<Option<ExecContext>>,
    active: AtomicBool,
    halted: AtomicBool,
    priority: AtomicU32,
    cycle: AtomicU64,
    name: Mutex<Vec<u8>>,
    children: Mutex<Vec<ProcessId>>,
}

impl Process {
    pub(crate) fn new(
        id: ProcessId,
        arena: Arc<Arena>,
        heap_bytes: u32,
        stack_bytes: u32,
    ) -> Result<Self, KernelError> {
        let heap = Heap::new(Arc::clone(&arena), heap_bytes)?;
        let stack = Stack::new(Arc::clone(&arena), stack_bytes)?;
        Ok(Self {
            id,
            arena,
            image: Mutex::new(None),
            context: Mutex::new(Some(ExecContext {
                heap,
                stack,
                cursor: None,
            })),
            active: AtomicBool::new(true),
            halted: AtomicBool::new(false),
            priority: AtomicU32::new(Config::DEFAULT_PROCESS_PRIORITY),
            cycle: AtomicU64::new(0),
            name: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Copy `bytes` into the arena and bind them as this process's program.
    /// A process is bound at most once; a second bind fails and leaves the
    /// first program in place.
    pub fn bind_program(&self, bytes: &[u8]) -> Result<(), KernelError> {
        self.check_bindable()?;
        let image = ProgramImage::load(Arc::clone(&self.arena), bytes)?;
        self.bind_image(image)
    }

    pub fn bind_image(&self, image: ProgramImage) -> Result<(), KernelError> {
        let mut slot = self.image.lock();
        self.check_bindable_locked(&slot)?;
        debug!(pid = %self.id, base = %image.base(), len = image.len(), entry = image.entry(), "program bound");
        *slot = Some(image);
        Ok(())
    }

    fn check_bindable(&self) -> Result<(), KernelError> {
        let slot = self.image.lock();
        self.check_bindable_locked(&slot)
    }

    fn check_bindable_locked(&self, slot: &Option<ProgramImage>) -> Result<(), KernelError> {
        if self.is_halted() {
            return Err(KernelError::Halted(self.id));
        }
        if slot.is_some() {
            return Err(KernelError::AlreadyBound(self.id));
        }
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.image.lock().is_some()
    }

    /// No program to run, or hung.
    pub fn is_idle(&self) -> bool {
        !self.active.load(Ordering::Acquire) || self.image.lock().is_none()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn hang(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Make a hung process runnable again. Halted processes stay halted.
    pub fn wake(&self) {
        if !self.is_halted() {
            self.active.store(true, Ordering::Release);
        }
    }

    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn set_priority(&self, priority: u32) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::Relaxed)
    }

    /// Advance the cycle counter without running anything. Workers tick
    /// idle processes so the starvation override compares like with like.
    pub fn tick(&self) {
        self.cycle.fetch_add(1, Ordering::Relaxed);
    }

    pub fn name(&self) -> Vec<u8> {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: Vec<u8>) {
        *self.name.lock() = name;
    }

    pub fn children(&self) -> Vec<ProcessId> {
        self.children.lock().clone()
    }

    pub(crate) fn add_child(&self, child: ProcessId) {
        let mut children = self.children.lock();
        if !children.contains(&child) {
            children.push(child);
        }
    }

    /// Create a child through the kernel and record it here.
    pub fn spawn_child(&self, kernel: &Kernel) -> Result<ProcessId, KernelError> {
        Ok(kernel.generate_process(Some(self.id))?.id())
    }

    /// Halt this process only. Safe to call more than once.
    pub fn halt(&self, kernel: &Kernel) {
        match kernel.process(self.id) {
            Some(_) => {
                if let Err(err) = kernel.halt_process(self.id) {
                    debug!(pid = %self.id, %err, "halted concurrently");
                }
            }
            None => self.release(),
        }
    }

    /// Halt this process and every descendant. Safe to call more than once.
    pub fn halt_recursive(&self, kernel: &Kernel) {
        match kernel.process(self.id) {
            Some(_) => {
                if let Err(err) = kernel.halt_process_recursive(self.id) {
                    debug!(pid = %self.id, %err, "halted concurrently");
                }
            }
            None => self.release(),
        }
    }

    pub fn rank(&self) -> Rank {
        Rank {
            id: self.id,
            priority: self.priority(),
            cycle: self.cycle(),
        }
    }

    pub fn schedules_before(&self, other: &Process) -> bool {
        self.rank().schedules_before(&other.rank())
    }

    /// Live operand stack, bottom first. `None` once halted.
    pub fn stack_snapshot(&self) -> Option<Vec<i64>> {
        self.context.lock().as_ref().map(|ctx| ctx.stack.snapshot())
    }

    pub fn heap_snapshot(&self) -> Option<BlockSnapshot> {
        self.context.lock().as_ref().map(|ctx| ctx.heap.snapshot())
    }

    /// Run up to `budget` instructions.
    ///
    /// Every outcome that ends the process is applied here: running off the
    /// end hangs it, `HALT` halts it through the kernel, and any fault
    /// (panics included) halts its whole subtree.
    pub fn execute(&self, kernel: &Kernel, budget: u32) -> Quantum {
        if !self.is_active() {
            return Quantum::Idle;
        }
        let Some(image) = self.image.lock().clone() else {
            return Quantum::Idle;
        };
        self.tick();

        let result = {
            let mut guard = self.context.lock();
            let Some(ctx) = guard.as_mut() else {
                return Quantum::Idle;
            };
            let mut cursor = ctx.cursor.unwrap_or(image.entry());
            let run = catch_unwind(AssertUnwindSafe(|| {
                Interpreter::new(kernel, self.id, &image, &mut ctx.heap, &mut ctx.stack)
                    .run(&mut cursor, budget)
            }));
            ctx.cursor = Some(cursor);
            match run {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Host("interpreter panicked".into())),
            }
        };

        match result {
            Ok(StepOutcome::Yielded) => Quantum::Yielded,
            Ok(StepOutcome::Finished) => {
                debug!(pid = %self.id, "program finished");
                self.hang();
                Quantum::Finished
            }
            Ok(StepOutcome::Halt { recursive }) => {
                self.hang();
                let halted = if recursive {
                    kernel.halt_process_recursive(self.id)
                } else {
                    kernel.halt_process(self.id)
                };
                if let Err(err) = halted {
                    warn!(pid = %self.id, %err, "HALT raced with another halt");
                }
                Quantum::Halted { recursive }
            }
            Err(err) => {
                warn!(pid = %self.id, %err, "execution fault, halting subtree");
                self.hang();
                if let Err(halt_err) = kernel.halt_process_recursive(self.id) {
                    warn!(pid = %self.id, %halt_err, "faulted process was already halted");
                }
                Quantum::Faulted(err)
            }
        }
    }

    /// Drop the program, heap and stack. Idempotent. Waits for an in-flight
    /// quantum to finish before anything is freed.
    pub(crate) fn release(&self) {
        self.hang();
        if self.halted.swap(true, Ordering::AcqRel) {
            return;
        }
        let image = self.image.lock().take();
        let context = self.context.lock().take();
        drop(context);
        drop(image);
        info!(pid = %self.id, "process released");
    }
}
