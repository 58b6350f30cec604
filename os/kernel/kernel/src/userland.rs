//! # Entering Ring 3
//!
//! A dispatch maps the process page at the user window and `iretq`s into
//! the saved register state. The return frame is laid out as a
//! [`TrapFrame`] so the exit sequence matches the tail of the trap path.

use crate::vmem;
use kernel_info::segments::{USER_CS, USER_DS};
use kernel_sched::{Dispatch, TrapFrame};
use kernel_sync::IrqGuard;
use kernel_sync::irq::RFLAGS_IF;
use log::trace;

/// `IOPL` bits of `RFLAGS`; user code never gets port access.
const RFLAGS_IOPL: u64 = 0b11 << 12;

/// Resumes `dispatch` in ring 3.
///
/// `irq` is the suppression the caller held while selecting the process.
/// It is handed off without unmasking: `iretq` loads `IF` from the frame.
pub fn enter(dispatch: Dispatch, irq: IrqGuard) -> ! {
    vmem::map_user_page(dispatch.page);

    let regs = dispatch.regs;
    let frame = TrapFrame {
        gpr: regs.gpr,
        vector: 0,
        error_code: 0,
        rip: regs.rip,
        cs: u64::from(USER_CS),
        rflags: (regs.rflags | RFLAGS_IF) & !RFLAGS_IOPL,
        rsp: regs.rsp,
        ss: u64::from(USER_DS),
    };
    trace!("entering {} at {:#x}", dispatch.pid, frame.rip);

    irq.hand_off();
    unsafe {
        core::arch::asm!(
            "mov rsp, {frame}",
            "pop rax",
            "pop rbx",
            "pop rcx",
            "pop rdx",
            "pop rsi",
            "pop rdi",
            "pop rbp",
            "pop r8",
            "pop r9",
            "pop r10",
            "pop r11",
            "pop r12",
            "pop r13",
            "pop r14",
            "pop r15",
            "add rsp, 16",
            "iretq",
            frame = in(reg) &raw const frame,
            options(noreturn)
        )
    }
}
