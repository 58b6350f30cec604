//! The kernel context: every piece of mutable scheduling state in one object.

use crate::clock::Clock;
use crate::console::{Console, TerminalId};
use crate::process::{BlockReason, Process, ProcessId, ProcessState, Registers};
use crate::programs::{self, Program};
use crate::run_queue::RunQueue;
use crate::table::ProcessTable;
use crate::trap::{PageFaultError, TrapAction, TrapFrame, TrapKind};
use crate::work_queue::{Work, WorkQueue};
use alloc::collections::BTreeMap;
use core::ptr::NonNull;
use kernel_alloc::{AllocError, HUGE_ALLOC_SIZE, KernelHeap};
use kernel_info::config::{PREEMPT_INTERVAL_MS, TIMER_HZ, USER_STACK_RESERVE, WORK_QUEUE_CAPACITY};
use log::{debug, error, info, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("no program with that name")]
    UnknownProgram,
    #[error("image of {size} bytes does not fit below the user stack")]
    ImageTooLarge { size: usize },
    #[error("no memory for a process page: {0}")]
    OutOfMemory(#[from] AllocError),
}

/// A process selected to run, with everything the dispatch path needs.
#[derive(Debug, Copy, Clone)]
pub struct Dispatch {
    pub pid: ProcessId,
    /// Kernel address of the page to map at the user window.
    pub page: NonNull<u8>,
    pub regs: Registers,
}

/// Scheduler, process table and deferred work of the single CPU.
///
/// The binary keeps the only instance behind an interrupt-guarded cell;
/// trap handlers and the idle loop borrow it for the duration of one
/// decision.
pub struct Kernel<C> {
    pub(crate) heap: &'static KernelHeap,
    pub(crate) console: C,
    pub(crate) programs: &'static [Program],
    pub(crate) processes: ProcessTable,
    pub(crate) run_queue: RunQueue,
    pub(crate) work: WorkQueue,
    pub(crate) clock: Clock,
    /// Process blocked in `read_line`, per terminal.
    pub(crate) readers: BTreeMap<TerminalId, ProcessId>,
    pub(crate) running: Option<ProcessId>,
    pub(crate) input_work: Option<Work>,
    last_capture_ms: u64,
    preempt_interval_ms: u64,
}

impl<C: Console> Kernel<C> {
    #[must_use]
    pub fn new(heap: &'static KernelHeap, console: C, programs: &'static [Program]) -> Self {
        Self {
            heap,
            console,
            programs,
            processes: ProcessTable::new(),
            run_queue: RunQueue::new(),
            work: WorkQueue::with_capacity(WORK_QUEUE_CAPACITY),
            clock: Clock::new(TIMER_HZ),
            readers: BTreeMap::new(),
            running: None,
            input_work: None,
            last_capture_ms: 0,
            preempt_interval_ms: PREEMPT_INTERVAL_MS,
        }
    }

    pub const fn console(&self) -> &C {
        &self.console
    }

    pub const fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn programs(&self) -> &'static [Program] {
        self.programs
    }

    /// The process currently loaded into the CPU.
    pub const fn running(&self) -> Option<ProcessId> {
        self.running
    }

    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(pid)
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn run_queue_len(&self) -> usize {
        self.run_queue.len()
    }

    /// Whether `pid` takes part in scheduling.
    pub fn is_runnable(&self, pid: ProcessId) -> bool {
        self.run_queue.contains(pid)
    }

    /// Process blocked reading from `terminal`, if any.
    pub fn reader_of(&self, terminal: TerminalId) -> Option<ProcessId> {
        self.readers.get(&terminal).copied()
    }

    /// Starts the program called `name` on `terminal`.
    pub fn spawn(&mut self, name: &str, terminal: TerminalId) -> Result<ProcessId, SpawnError> {
        let program = programs::find(self.programs, name.as_bytes()).ok_or(SpawnError::UnknownProgram)?;
        self.spawn_program(program, terminal)
    }

    /// Loads `program` into a fresh page and appends it to the run queue.
    pub fn spawn_program(&mut self, program: &Program, terminal: TerminalId) -> Result<ProcessId, SpawnError> {
        let size = program.image.len();
        if size > HUGE_ALLOC_SIZE - USER_STACK_RESERVE {
            return Err(SpawnError::ImageTooLarge { size });
        }

        let page = self.heap.allocate_huge()?;
        // SAFETY: the page is a fresh, exclusively owned huge allocation.
        unsafe {
            core::ptr::write_bytes(page.as_ptr(), 0, HUGE_ALLOC_SIZE);
            core::ptr::copy_nonoverlapping(program.image.as_ptr(), page.as_ptr(), size);
        }

        let pid = self.processes.insert(Process {
            name: program.name,
            regs: Registers::at_entry(),
            terminal,
            page,
            waiter: None,
            state: ProcessState::Runnable,
            dispatches: 0,
        });
        self.run_queue.push_back(pid);
        info!("spawned {} as {pid} on terminal {}", program.name, terminal.0);
        Ok(pid)
    }

    /// Ends `pid`: frees its page, detaches it from whatever it waited on,
    /// and wakes its waiter.
    ///
    /// Returns `false` for a stale handle.
    pub fn terminate(&mut self, pid: ProcessId) -> bool {
        let Some(process) = self.processes.remove(pid) else {
            warn!("terminate: no process {pid}");
            return false;
        };

        self.run_queue.remove(pid);
        if self.running == Some(pid) {
            self.running = None;
        }
        if self.readers.get(&process.terminal) == Some(&pid) {
            self.readers.remove(&process.terminal);
        }
        if let ProcessState::Blocked(BlockReason::Wait(target)) = process.state
            && let Some(target) = self.processes.get_mut(target)
        {
            target.waiter = None;
        }

        // SAFETY: the page came from `allocate_huge` and the record that owned
        // it is gone, so nothing refers to it any more.
        unsafe { self.heap.release(process.page.as_ptr()) };
        self.console.process_done(process.terminal, pid);
        info!("{} ({pid}) terminated", process.name);

        if let Some(waiter) = process.waiter {
            self.wake(waiter, 0);
        }
        true
    }

    /// Moves a blocked process back to the run queue tail with `rax` as its
    /// syscall result.
    pub(crate) fn wake(&mut self, pid: ProcessId, rax: u64) {
        let Some(process) = self.processes.get_mut(pid) else {
            warn!("wake: no process {pid}");
            return;
        };
        process.regs.gpr.rax = rax;
        process.state = ProcessState::Runnable;
        self.run_queue.push_back(pid);
        debug!("woke {pid}");
    }

    /// Takes `pid` out of the run queue until `reason` is resolved.
    pub(crate) fn block(&mut self, pid: ProcessId, reason: BlockReason) {
        if let Some(process) = self.processes.get_mut(pid) {
            process.state = ProcessState::Blocked(reason);
        }
        self.run_queue.remove(pid);
        if self.running == Some(pid) {
            self.running = None;
        }
        debug!("{pid} blocked on {reason:?}");
    }

    /// Advances the run queue cursor and prepares the chosen process for
    /// dispatch.
    ///
    /// Call with interrupts suppressed and keep them suppressed until the
    /// process is entered.
    pub fn select_next(&mut self) -> Option<Dispatch> {
        if let Some(previous) = self.running.take()
            && let Some(process) = self.processes.get_mut(previous)
            && process.state == ProcessState::Running
        {
            process.state = ProcessState::Runnable;
        }

        for _ in 0..self.run_queue.len() {
            let pid = self.run_queue.advance()?;
            let Some(process) = self.processes.get_mut(pid) else {
                warn!("run queue held stale {pid}");
                self.run_queue.remove(pid);
                continue;
            };

            process.state = ProcessState::Running;
            process.dispatches += 1;
            self.running = Some(pid);
            self.last_capture_ms = self.clock.uptime_ms();
            trace!("dispatching {pid}");
            return Some(Dispatch {
                pid,
                page: process.page,
                regs: process.regs,
            });
        }
        None
    }

    pub fn push_work(&mut self, work: Work) {
        self.work.push(work);
    }

    pub fn pop_work(&mut self) -> Option<Work> {
        self.work.pop()
    }

    pub fn pending_work(&self) -> usize {
        self.work.len()
    }

    /// Callback queued for every keyboard interrupt.
    pub fn set_input_work(&mut self, work: Work) {
        self.input_work = Some(work);
    }

    pub fn register_periodic(&mut self, period_ms: u64, work: Work) {
        self.clock.register_periodic(period_ms, work);
    }

    /// Hands a line typed on `terminal` to the process blocked reading it.
    ///
    /// Returns `false` if nobody is waiting for input there.
    pub fn deliver_line(&mut self, terminal: TerminalId, line: &[u8]) -> bool {
        let Some(pid) = self.readers.remove(&terminal) else {
            return false;
        };
        let Some(process) = self.processes.get_mut(pid) else {
            warn!("reader {pid} of terminal {} is gone", terminal.0);
            return false;
        };

        let buffer = process.regs.gpr.rdi;
        let capacity = usize::try_from(process.regs.gpr.rsi).unwrap_or(usize::MAX);
        let len = line.len().min(capacity);
        match process.user_bytes_mut(buffer, len as u64) {
            Some(dst) => dst.copy_from_slice(&line[..len]),
            None => warn!("{pid}: read_line buffer {buffer:#x} no longer valid"),
        }
        self.wake(pid, len as u64);
        true
    }

    /// Handles one trap. The caller has already acknowledged the interrupt
    /// controller for hardware interrupts.
    ///
    /// `fault_address` is CR2 for page faults and ignored otherwise.
    pub fn handle_trap(&mut self, kind: TrapKind, frame: &mut TrapFrame, fault_address: u64) -> TrapAction {
        match kind {
            TrapKind::Timer => self.on_timer(frame),
            TrapKind::Keyboard => {
                if let Some(work) = self.input_work {
                    self.work.push(work);
                }
                TrapAction::Resume
            }
            TrapKind::Irq { line } => {
                debug!("irq {line}");
                TrapAction::Resume
            }
            TrapKind::Syscall => self.handle_syscall(frame),
            TrapKind::DoubleFault => {
                error!("double fault: {frame:?}");
                self.on_fault(frame)
            }
            TrapKind::PageFault => {
                let err = PageFaultError::from_bits(frame.error_code);
                error!("page fault at {fault_address:#018x}: {} ({frame:?})", err.explain());
                self.on_fault(frame)
            }
            TrapKind::FaultWithCode => {
                error!("exception with error code {:#x}: {frame:?}", frame.error_code);
                self.on_fault(frame)
            }
            TrapKind::DivideByZero => {
                error!("divide error: {frame:?}");
                self.on_fault(frame)
            }
            TrapKind::Fault => {
                error!("exception: {frame:?}");
                self.on_fault(frame)
            }
        }
    }

    fn on_timer(&mut self, frame: &TrapFrame) -> TrapAction {
        let now = self.clock.tick(&mut self.work);

        let Some(pid) = self.running else {
            return TrapAction::Resume;
        };
        if !frame.from_user_window() || now.saturating_sub(self.last_capture_ms) < self.preempt_interval_ms {
            return TrapAction::Resume;
        }
        let Some(process) = self.processes.get_mut(pid) else {
            return TrapAction::Resume;
        };

        process.regs = Registers::capture(frame);
        process.state = ProcessState::Runnable;
        self.running = None;
        self.last_capture_ms = now;
        trace!("preempted {pid} at {now} ms");
        TrapAction::EnterIdle
    }

    /// Every fault ends the current process. For a kernel-mode fault its
    /// saved registers predate the interrupted syscall or dispatch, so it
    /// cannot be resumed either.
    fn on_fault(&mut self, frame: &TrapFrame) -> TrapAction {
        if let Some(pid) = self.running {
            if frame.from_user_mode() {
                warn!("terminating {pid} after a user fault");
            } else {
                warn!("terminating {pid} after a kernel fault on its behalf");
            }
            self.terminate(pid);
        }
        TrapAction::EnterIdle
    }
}
