//! # Nestable interrupt suppression
//!
//! The kernel runs on a single core, so masking hardware interrupts is the
//! only mutual exclusion it needs. Critical sections nest freely: a depth
//! counter tracks how many sections are open, the first [`enter`] snapshots
//! the interrupt flag and masks interrupts, and the matching last [`leave`]
//! unmasks them again only if they were enabled to begin with.
//!
//! Callers normally use the scoped [`IrqGuard`] returned by [`suppress`].
//!
//! On bare metal the flag is the real `IF` bit (`cli`/`sti`/`pushfq`). On a
//! hosted target the flag is emulated per thread so the same code can be
//! exercised by unit tests.

use log::warn;

/// Bit 9 of `RFLAGS`.
pub const RFLAGS_IF: u64 = 1 << 9;

#[derive(Copy, Clone, Debug, Default)]
struct Suppression {
    depth: usize,
    were_enabled: bool,
}

#[cfg(target_os = "none")]
mod cpu {
    use super::{RFLAGS_IF, Suppression};
    use core::cell::UnsafeCell;

    struct StateCell(UnsafeCell<Suppression>);

    // SAFETY: single core; only touched with interrupts masked.
    unsafe impl Sync for StateCell {}

    static STATE: StateCell = StateCell(UnsafeCell::new(Suppression {
        depth: 0,
        were_enabled: false,
    }));

    #[inline]
    pub fn with_state<R>(f: impl FnOnce(&mut Suppression) -> R) -> R {
        // SAFETY: every caller masks interrupts before or during the access,
        // and there is no second core.
        f(unsafe { &mut *STATE.0.get() })
    }

    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn rflags() -> u64 {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags)) }
        r
    }

    #[inline]
    pub fn enabled() -> bool {
        rflags() & RFLAGS_IF != 0
    }
}

#[cfg(not(target_os = "none"))]
mod cpu {
    use super::{RFLAGS_IF, Suppression};
    use std::cell::Cell;

    std::thread_local! {
        static STATE: Cell<Suppression> = const { Cell::new(Suppression { depth: 0, were_enabled: false }) };
        static FLAG: Cell<bool> = const { Cell::new(true) };
    }

    pub fn with_state<R>(f: impl FnOnce(&mut Suppression) -> R) -> R {
        STATE.with(|cell| {
            let mut state = cell.get();
            let result = f(&mut state);
            cell.set(state);
            result
        })
    }

    pub fn disable() {
        FLAG.with(|f| f.set(false));
    }

    pub fn enable() {
        FLAG.with(|f| f.set(true));
    }

    pub fn rflags() -> u64 {
        if enabled() { RFLAGS_IF | 0x2 } else { 0x2 }
    }

    pub fn enabled() -> bool {
        FLAG.with(Cell::get)
    }
}

/// Returns the current `RFLAGS` value.
///
/// Only `IF` is meaningful on hosted targets.
#[inline]
#[must_use]
pub fn rflags() -> u64 {
    cpu::rflags()
}

/// Whether hardware interrupts are currently unmasked.
#[inline]
#[must_use]
pub fn are_enabled() -> bool {
    cpu::enabled()
}

/// Number of currently open critical sections.
#[inline]
#[must_use]
pub fn depth() -> usize {
    cpu::with_state(|s| s.depth)
}

/// Opens a critical section.
///
/// The first call masks interrupts and remembers whether they were enabled.
pub fn enter() {
    let enabled = cpu::enabled();
    if enabled {
        cpu::disable();
    }
    cpu::with_state(|s| {
        if s.depth == 0 {
            s.were_enabled = enabled;
        }
        s.depth += 1;
    });
}

/// Closes a critical section opened by [`enter`].
///
/// Interrupts are unmasked once the depth returns to zero, and only if they
/// were enabled when the outermost section was opened. A `leave` without a
/// matching `enter` is logged and otherwise ignored.
pub fn leave() {
    let restore = cpu::with_state(|s| {
        if s.depth == 0 {
            return None;
        }
        s.depth -= 1;
        Some(s.depth == 0 && s.were_enabled)
    });

    match restore {
        None => warn!("interrupt suppression released without a matching suppress"),
        Some(true) => cpu::enable(),
        Some(false) => {}
    }
}

/// Unmasks interrupts outside of any critical section.
///
/// Used by the idle loop. Calling this with sections open is a bug in the
/// caller and leaves the flag untouched.
pub fn enable() {
    let depth = depth();
    if depth == 0 {
        cpu::enable();
    } else {
        warn!("refusing to enable interrupts inside {depth} open critical section(s)");
    }
}

/// Masks interrupts without opening a critical section.
pub fn disable() {
    cpu::disable();
}

/// Forgets all open critical sections without touching the interrupt flag.
///
/// Control that re-enters the idle loop from a trap handler abandons the
/// stack frames that owned those sections.
pub fn reset() {
    cpu::with_state(|s| *s = Suppression::default());
}

/// Opens a critical section for the lifetime of the returned guard.
#[inline]
#[must_use = "interrupts are restored as soon as the guard is dropped"]
pub fn suppress() -> IrqGuard {
    IrqGuard::new()
}

/// RAII guard for one level of interrupt suppression.
///
/// # Examples
///
/// ```
/// use kernel_sync::irq;
///
/// {
///     let _outer = irq::suppress();
///     {
///         let _inner = irq::suppress();
///         assert_eq!(irq::depth(), 2);
///     }
///     assert!(!irq::are_enabled());
/// }
/// assert_eq!(irq::depth(), 0);
/// ```
pub struct IrqGuard {
    _private: (),
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        enter();
        Self { _private: () }
    }

    /// Closes this section without unmasking interrupts.
    ///
    /// For the dispatch path, where `iretq` loads the flag from the return frame.
    #[inline]
    pub fn hand_off(self) {
        core::mem::forget(self);
        cpu::with_state(|s| {
            s.depth = s.depth.saturating_sub(1);
            if s.depth == 0 {
                s.were_enabled = false;
            }
        });
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        leave();
    }
}
