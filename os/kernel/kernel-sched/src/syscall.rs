//! The `int 0x80` service.

use crate::console::Console;
use crate::kernel::Kernel;
use crate::process::{BlockReason, ProcessId, Registers};
use crate::programs;
use crate::trap::{TrapAction, TrapFrame};
use kernel_sync::irq;
use kernel_syscall::{Color, SYSCALL_ERROR, Sysno, UnknownSyscall};
use log::{debug, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyscallError {
    #[error(transparent)]
    Unknown(#[from] UnknownSyscall),
    #[error("argument {0:#x} does not point into the user window")]
    BadPointer(u64),
    #[error("no process with id {0:#x}")]
    NoSuchProcess(u64),
    #[error("a process cannot wait on itself")]
    WaitOnSelf,
    #[error("process {0} already has a waiter")]
    AlreadyWaited(ProcessId),
    #[error("terminal already has a blocked reader")]
    ReaderBusy,
}

/// What happens to the caller after a successful call.
enum Outcome {
    /// Resume with this value in `rax`.
    Return(u64),
    /// The caller left the run queue; continue in the idle loop.
    Blocked,
    /// The caller is gone.
    Exited,
}

impl<C: Console> Kernel<C> {
    pub(crate) fn handle_syscall(&mut self, frame: &mut TrapFrame) -> TrapAction {
        if !frame.from_user_window() {
            warn!("ignoring syscall from outside the user window: {frame:?}");
            return TrapAction::Resume;
        }
        let Some(pid) = self.running else {
            warn!("syscall without a running process: {frame:?}");
            return TrapAction::Resume;
        };
        let Some(process) = self.processes.get_mut(pid) else {
            warn!("syscall from stale {pid}");
            return TrapAction::Resume;
        };
        process.regs = Registers::capture(frame);

        match self.dispatch_syscall(pid, frame) {
            Ok(Outcome::Return(value)) => {
                frame.gpr.rax = value;
                TrapAction::Resume
            }
            Ok(Outcome::Blocked | Outcome::Exited) => TrapAction::EnterIdle,
            Err(e) => {
                warn!("{pid}: syscall {} failed: {e}", frame.gpr.rax);
                frame.gpr.rax = SYSCALL_ERROR;
                TrapAction::Resume
            }
        }
    }

    fn dispatch_syscall(&mut self, pid: ProcessId, frame: &TrapFrame) -> Result<Outcome, SyscallError> {
        let regs = &frame.gpr;
        match Sysno::try_from(regs.rax)? {
            Sysno::Exit => {
                debug!("{pid}: exit");
                self.terminate(pid);
                Ok(Outcome::Exited)
            }
            Sysno::Print => self.sys_print(pid, regs.rdi, regs.rsi),
            Sysno::ReadLine => self.sys_read_line(pid, regs.rdi, regs.rsi),
            Sysno::Spawn => self.sys_spawn(pid, regs.rdi),
            Sysno::Wait => self.sys_wait(pid, regs.rdi),
        }
    }

    fn sys_print(&mut self, pid: ProcessId, text: u64, color: u64) -> Result<Outcome, SyscallError> {
        let Some(process) = self.processes.get(pid) else {
            return Err(SyscallError::NoSuchProcess(pid.to_raw()));
        };
        let bytes = process.user_str(text).ok_or(SyscallError::BadPointer(text))?;

        let _irq = irq::suppress();
        self.console
            .print_color_to(process.terminal, bytes, Color::from_register(color));
        Ok(Outcome::Return(bytes.len() as u64))
    }

    fn sys_read_line(&mut self, pid: ProcessId, buffer: u64, capacity: u64) -> Result<Outcome, SyscallError> {
        let Some(process) = self.processes.get(pid) else {
            return Err(SyscallError::NoSuchProcess(pid.to_raw()));
        };
        if process.user_bytes(buffer, capacity).is_none() {
            return Err(SyscallError::BadPointer(buffer));
        }
        let terminal = process.terminal;
        if self.readers.contains_key(&terminal) {
            return Err(SyscallError::ReaderBusy);
        }

        self.readers.insert(terminal, pid);
        self.block(pid, BlockReason::ReadLine);
        Ok(Outcome::Blocked)
    }

    fn sys_spawn(&mut self, pid: ProcessId, name: u64) -> Result<Outcome, SyscallError> {
        let Some(process) = self.processes.get(pid) else {
            return Err(SyscallError::NoSuchProcess(pid.to_raw()));
        };
        let terminal = process.terminal;
        let bytes = process.user_str(name).ok_or(SyscallError::BadPointer(name))?;

        let Some(program) = programs::find(self.programs, bytes) else {
            debug!("{pid}: spawn of unknown program");
            return Ok(Outcome::Return(0));
        };
        match self.spawn_program(program, terminal) {
            Ok(child) => Ok(Outcome::Return(child.to_raw())),
            Err(e) => {
                warn!("{pid}: spawn of {} failed: {e}", program.name);
                Ok(Outcome::Return(0))
            }
        }
    }

    fn sys_wait(&mut self, pid: ProcessId, raw: u64) -> Result<Outcome, SyscallError> {
        let target = ProcessId::from_raw(raw).ok_or(SyscallError::NoSuchProcess(raw))?;
        if target == pid {
            return Err(SyscallError::WaitOnSelf);
        }
        let process = self
            .processes
            .get_mut(target)
            .ok_or(SyscallError::NoSuchProcess(raw))?;
        if process.waiter.is_some() {
            return Err(SyscallError::AlreadyWaited(target));
        }

        process.waiter = Some(pid);
        self.block(pid, BlockReason::Wait(target));
        Ok(Outcome::Blocked)
    }
}
