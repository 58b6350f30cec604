use alloc::boxed::Box;
use alloc::vec;
use kernel_sync::irq;

/// A deferred piece of work.
pub type Work = fn();

/// FIFO ring of deferred callbacks.
///
/// Interrupt handlers push (with interrupts already suppressed), the idle
/// loop pops. A full ring doubles its storage instead of dropping work.
pub struct WorkQueue {
    slots: Box<[Option<Work>]>,
    head: usize,
    len: usize,
}

impl WorkQueue {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `work`.
    ///
    /// Callers must have interrupts suppressed.
    pub fn push(&mut self, work: Work) {
        if self.len == self.slots.len() {
            self.grow();
        }
        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail] = Some(work);
        self.len += 1;
    }

    /// Removes the oldest callback.
    pub fn pop(&mut self) -> Option<Work> {
        let _irq = irq::suppress();
        if self.len == 0 {
            return None;
        }
        let work = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        work
    }

    /// Doubles the storage and moves the live entries to its front.
    fn grow(&mut self) {
        let capacity = self.slots.len();
        let mut slots = vec![None; capacity * 2].into_boxed_slice();
        for (i, slot) in slots.iter_mut().take(self.len).enumerate() {
            *slot = self.slots[(self.head + i) % capacity].take();
        }
        log::debug!("work queue grown to {} slots", capacity * 2);
        self.slots = slots;
        self.head = 0;
    }
}
