//! # Trap Path
//!
//! Every IDT slot points at a 16-byte stub generated below. A stub pushes a
//! zero in place of the error code where the CPU does not push one, then
//! its vector number, and jumps to [`trap_common`], which saves the general
//! registers so the stack holds one uniform [`TrapFrame`]:
//!
//! ```text
//!  high  ss rsp rflags cs rip    (CPU)
//!        error_code              (CPU or stub)
//!        vector                  (stub)
//!  low   r15 .. rax              (trap_common)
//! ```
//!
//! [`trap_entry`] acknowledges the interrupt controller, hands the frame to
//! the scheduler and either returns (`iretq` into the interrupted context,
//! with whatever the handler changed in the frame) or abandons this stack
//! for the idle loop.

use crate::{idle, init, keyboard, pic, ports};
use core::arch::{asm, global_asm, naked_asm};
use kernel_sched::trap::{TrapAction, TrapFrame, TrapKind};
use log::error;

/// Distance between two trap stubs.
const STUB_SIZE: u64 = 16;

// One stub per vector. The vector list in the `.if` mirrors
// `kernel_sched::trap::VECTORS_WITH_ERROR_CODE`.
global_asm!(
    ".pushsection .text.trap_stubs, \"ax\"",
    ".balign 16",
    ".global trap_stubs",
    "trap_stubs:",
    ".set vector, 0",
    ".rept 256",
    "    .balign 16",
    "    .if (vector == 8) || ((vector >= 10) && (vector <= 14)) || (vector == 17) || (vector == 21) || (vector == 29) || (vector == 30)",
    "    .else",
    "        pushq $0",
    "    .endif",
    "    pushq $vector",
    "    jmp {common}",
    "    .set vector, vector + 1",
    ".endr",
    ".popsection",
    common = sym trap_common,
    options(att_syntax)
);

unsafe extern "C" {
    static trap_stubs: [u8; 0];
}

/// Address of the stub for `vector`.
pub fn trap_stub(vector: u8) -> u64 {
    (&raw const trap_stubs) as u64 + u64::from(vector) * STUB_SIZE
}

#[unsafe(naked)]
unsafe extern "C" fn trap_common() {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdi",
        "push rsi",
        "push rdx",
        "push rcx",
        "push rbx",
        "push rax",
        // rdi = &mut TrapFrame; rbx survives the call.
        "mov rdi, rsp",
        "mov rbx, rsp",
        "and rsp, -16",
        "cld",
        "call {entry}",
        "mov rsp, rbx",
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
        // vector and error code
        "add rsp, 16",
        "iretq",
        entry = sym trap_entry,
    );
}

#[allow(clippy::cast_possible_truncation)]
extern "C" fn trap_entry(frame: &mut TrapFrame) {
    let kind = TrapKind::classify(frame.vector as u8);

    match kind {
        TrapKind::Keyboard => {
            keyboard::push_scancode(unsafe { ports::inb(keyboard::DATA_PORT) });
            pic::end_of_interrupt(1);
        }
        TrapKind::Timer => pic::end_of_interrupt(0),
        TrapKind::Irq { line } => pic::end_of_interrupt(line),
        _ => {}
    }

    let fault_address = if kind == TrapKind::PageFault { read_cr2() } else { 0 };

    let Some(kernel) = init::kernel() else {
        // Spurious trap before the scheduler exists.
        if kind.is_fault() {
            panic!("{kind:?} during bring-up: {frame:?}");
        }
        return;
    };
    let mut kernel = match kernel.try_lock() {
        Some(guard) => guard,
        None if kind.is_fault() => {
            error!("{kind:?} while the kernel was locked, abandoning that context: {frame:?}");
            // SAFETY: the frames holding the borrow are left for the idle loop
            // below and never resume.
            unsafe { kernel.force_unlock() };
            kernel.lock()
        }
        None => panic!("{kind:?} while the kernel was locked: {frame:?}"),
    };

    let action = kernel.handle_trap(kind, frame, fault_address);
    if kind == TrapKind::Timer {
        init::publish_uptime(kernel.clock().uptime_ms());
    }
    drop(kernel);

    match action {
        TrapAction::Resume => {}
        TrapAction::EnterIdle => {
            if kind == TrapKind::DoubleFault && !frame.from_user_mode() {
                error!("double fault in kernel mode, abandoning the interrupted context");
            }
            idle::enter();
        }
    }
}

fn read_cr2() -> u64 {
    let cr2: u64;
    unsafe {
        asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    cr2
}
