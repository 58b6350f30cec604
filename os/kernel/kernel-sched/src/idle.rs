//! One round of the idle loop, independent of how the CPU halts or enters
//! user mode.

use crate::console::Console;
use crate::kernel::{Dispatch, Kernel};
use kernel_sync::{IrqCell, IrqGuard};

/// Outcome of [`idle_round`]. Both variants carry the critical section the
/// decision was made in; it must stay open until the CPU is in user mode or
/// halted with `sti; hlt`.
#[must_use]
pub enum IdleStep {
    Dispatch(Dispatch, IrqGuard),
    Halt(IrqGuard),
}

/// Runs deferred work until the queue is empty, then picks the next process.
///
/// Callbacks run with the cell unlocked, so they may lock it themselves and
/// queue further work. The selection happens in the same critical section
/// that observed the empty queue.
pub fn idle_round<C: Console>(cell: &IrqCell<Kernel<C>>) -> IdleStep {
    loop {
        let mut kernel = cell.lock();
        if let Some(work) = kernel.pop_work() {
            drop(kernel);
            work();
            continue;
        }

        let next = kernel.select_next();
        let irq = kernel.into_irq_guard();
        return match next {
            Some(dispatch) => IdleStep::Dispatch(dispatch, irq),
            None => IdleStep::Halt(irq),
        };
    }
}
