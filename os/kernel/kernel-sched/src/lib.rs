//! # Scheduling core
//!
//! Hardware-independent half of the kernel: the process table and run
//! queue, deferred work, trap classification and the syscall service. The
//! kernel binary owns one [`Kernel`] and forwards every trap to
//! [`Kernel::handle_trap`]; the returned [`TrapAction`] tells it whether to
//! `iretq` into the interrupted context or continue in the idle loop, which
//! in turn asks [`Kernel::select_next`] what to dispatch.
//!
//! ```text
//!  IRQ ──► handle_trap ──► WorkQueue ──► idle loop ──► select_next ──► iretq
//!              ▲                                                         │
//!              └────────────────────── int 0x80 / timer ◄────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod clock;
mod console;
mod idle;
mod kernel;
mod process;
pub mod programs;
mod run_queue;
mod syscall;
mod table;
pub mod trap;
mod work_queue;

pub use clock::Clock;
pub use console::{Console, LineEditor, TerminalId};
pub use idle::{IdleStep, idle_round};
pub use kernel::{Dispatch, Kernel, SpawnError};
pub use process::{BlockReason, Process, ProcessId, ProcessState, Registers, USER_RFLAGS};
pub use programs::Program;
pub use run_queue::RunQueue;
pub use syscall::SyscallError;
pub use table::ProcessTable;
pub use trap::{GeneralRegisters, TrapAction, TrapFrame, TrapKind};
pub use work_queue::{Work, WorkQueue};
