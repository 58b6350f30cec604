//! # Idle Loop
//!
//! The scheduler's home. Control arrives here at the end of bring-up and
//! whenever a trap decides not to return to the interrupted context
//! (preemption, a blocking or exiting syscall, a fault). Each round drains
//! the work queue, then either dispatches the next runnable process or
//! halts until the next interrupt.

use crate::init;
use crate::tss::Stack;
use crate::userland;
use core::arch::{asm, naked_asm};
use kernel_info::memory::IDLE_STACK_SIZE;
use kernel_sched::IdleStep;
use kernel_sync::irq;

static IDLE_STACK: Stack<IDLE_STACK_SIZE> = Stack::new();

/// Abandons the current stack and restarts the idle loop on its own.
#[unsafe(naked)]
pub extern "C" fn enter() -> ! {
    naked_asm!(
        "cli",
        "lea rsp, [rip + {stack}]",
        "add rsp, {size}",
        "xor ebp, ebp",
        "call {idle}",
        "ud2",
        stack = sym IDLE_STACK,
        size = const IDLE_STACK_SIZE,
        idle = sym idle_loop,
    );
}

extern "C" fn idle_loop() -> ! {
    // Sections opened by the abandoned frames are gone.
    irq::reset();
    irq::enable();

    let Some(kernel) = init::kernel() else {
        panic!("idle loop entered before the kernel was initialized");
    };

    loop {
        match kernel_sched::idle_round(kernel) {
            IdleStep::Dispatch(dispatch, irq) => userland::enter(dispatch, irq),
            IdleStep::Halt(irq) => {
                irq.hand_off();
                // `sti` takes effect after `hlt` starts, so no wakeup is lost.
                unsafe { asm!("sti", "hlt", options(nomem, nostack)) };
            }
        }
    }
}
