use crate::irq::IrqGuard;
use core::cell::{Cell, UnsafeCell};
use core::ops::{Deref, DerefMut};

/// Kernel state that may only be touched with interrupts suppressed.
///
/// On a single core this is a complete lock: while the guard lives no
/// interrupt handler can run, so the only way to observe the value twice is
/// re-entrant access from the same call chain. That is a bug and panics,
/// like a `RefCell` borrowed twice.
pub struct IrqCell<T> {
    borrowed: Cell<bool>,
    value: UnsafeCell<T>,
}

// SAFETY: access is serialized by interrupt suppression on one core.
unsafe impl<T: Send> Sync for IrqCell<T> {}

impl<T> IrqCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            borrowed: Cell::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Suppresses interrupts and borrows the value.
    ///
    /// # Panics
    /// If the value is already borrowed further up the call chain.
    #[inline]
    pub fn lock(&self) -> IrqCellGuard<'_, T> {
        self.try_lock()
            .unwrap_or_else(|| panic!("IrqCell already borrowed"))
    }

    /// Like [`lock`](Self::lock), but returns `None` instead of panicking.
    pub fn try_lock(&self) -> Option<IrqCellGuard<'_, T>> {
        let irq = IrqGuard::new();
        if self.borrowed.replace(true) {
            return None;
        }
        Some(IrqCellGuard { cell: self, irq })
    }

    /// Whether the value is currently borrowed.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.borrowed.get()
    }

    /// Clears the borrow flag without a guard.
    ///
    /// For a fault taken while the value was borrowed: the frames holding the
    /// guard are about to be abandoned, so their drop never runs.
    ///
    /// # Safety
    /// The borrowing frames must never resume, and no reference obtained
    /// through their guard may be used again.
    pub unsafe fn force_unlock(&self) {
        self.borrowed.set(false);
    }
}

impl<T: Default> Default for IrqCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct IrqCellGuard<'a, T> {
    cell: &'a IrqCell<T>,
    irq: IrqGuard,
}

impl<T> IrqCellGuard<'_, T> {
    /// Releases the borrow but keeps interrupts suppressed in the returned guard.
    #[must_use]
    pub fn into_irq_guard(self) -> IrqGuard {
        let this = core::mem::ManuallyDrop::new(self);
        this.cell.borrowed.set(false);
        // SAFETY: `this` is never dropped, so the guard is moved out exactly once.
        unsafe { core::ptr::read(&raw const this.irq) }
    }
}

impl<T> Deref for IrqCellGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the borrow flag grants exclusive access.
        unsafe { &*self.cell.value.get() }
    }
}

impl<T> DerefMut for IrqCellGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the borrow flag grants exclusive access.
        unsafe { &mut *self.cell.value.get() }
    }
}

impl<T> Drop for IrqCellGuard<'_, T> {
    fn drop(&mut self) {
        self.cell.borrowed.set(false);
    }
}
