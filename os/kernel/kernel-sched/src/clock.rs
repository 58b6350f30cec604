//! Tick counter and periodic-callback registry driven by the timer interrupt.

use crate::work_queue::{Work, WorkQueue};
use alloc::vec::Vec;

#[derive(Debug, Copy, Clone)]
struct Periodic {
    period_ms: u64,
    due_ms: u64,
    work: Work,
}

/// Milliseconds since boot, derived from timer ticks.
#[derive(Debug)]
pub struct Clock {
    ticks: u64,
    hz: u32,
    timers: Vec<Periodic>,
}

impl Clock {
    /// A clock advanced `hz` times per second.
    #[must_use]
    pub const fn new(hz: u32) -> Self {
        Self {
            ticks: 0,
            hz: if hz == 0 { 1 } else { hz },
            timers: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    #[inline]
    #[must_use]
    pub const fn uptime_ms(&self) -> u64 {
        self.ticks * 1000 / self.hz as u64
    }

    /// Queues `work` every `period_ms` milliseconds, first after one period.
    pub fn register_periodic(&mut self, period_ms: u64, work: Work) {
        let period_ms = period_ms.max(1);
        self.timers.push(Periodic {
            period_ms,
            due_ms: self.uptime_ms() + period_ms,
            work,
        });
    }

    /// Advances one tick and queues every callback that came due.
    ///
    /// Returns the new uptime in milliseconds.
    pub fn tick(&mut self, work: &mut WorkQueue) -> u64 {
        self.ticks += 1;
        let now = self.uptime_ms();
        for timer in &mut self.timers {
            if now >= timer.due_ms {
                work.push(timer.work);
                timer.due_ms = now + timer.period_ms;
            }
        }
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    std::thread_local! {
        static FIRED: Cell<u32> = const { Cell::new(0) };
    }

    fn fire() {
        FIRED.with(|f| f.set(f.get() + 1));
    }

    #[test]
    fn uptime_follows_frequency() {
        let mut clock = Clock::new(100);
        let mut work = WorkQueue::with_capacity(4);
        for _ in 0..25 {
            clock.tick(&mut work);
        }
        assert_eq!(clock.ticks(), 25);
        assert_eq!(clock.uptime_ms(), 250);
    }

    #[test]
    fn periodic_callbacks_are_queued_when_due() {
        let mut clock = Clock::new(1000);
        let mut work = WorkQueue::with_capacity(4);
        clock.register_periodic(10, fire);

        for _ in 0..9 {
            clock.tick(&mut work);
        }
        assert!(work.is_empty());

        for _ in 0..21 {
            clock.tick(&mut work);
        }
        assert_eq!(work.len(), 3);
        while let Some(job) = work.pop() {
            job();
        }
        assert_eq!(FIRED.with(Cell::get), 3);
    }
}
