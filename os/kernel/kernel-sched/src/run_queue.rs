use crate::process::ProcessId;
use alloc::vec::Vec;

/// Circular order of runnable processes.
///
/// The cursor marks the last process handed out by [`advance`](Self::advance);
/// the next call continues with its successor, wrapping at the end.
#[derive(Debug, Default)]
pub struct RunQueue {
    order: Vec<ProcessId>,
    cursor: Option<usize>,
}

impl RunQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            order: Vec::new(),
            cursor: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, pid: ProcessId) -> bool {
        self.order.contains(&pid)
    }

    /// Process under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<ProcessId> {
        self.cursor.map(|c| self.order[c])
    }

    /// Appends `pid` at the tail. Already queued processes are not duplicated.
    pub fn push_back(&mut self, pid: ProcessId) {
        if !self.contains(pid) {
            self.order.push(pid);
        }
    }

    /// Moves the cursor to the next process, seeding it from the head when
    /// no process has been selected yet.
    pub fn advance(&mut self) -> Option<ProcessId> {
        if self.order.is_empty() {
            self.cursor = None;
            return None;
        }
        let next = self.cursor.map_or(0, |c| (c + 1) % self.order.len());
        self.cursor = Some(next);
        Some(self.order[next])
    }

    /// Takes `pid` out of the rotation.
    ///
    /// If it was under the cursor, the cursor steps back so the next
    /// [`advance`](Self::advance) picks its former successor.
    pub fn remove(&mut self, pid: ProcessId) -> bool {
        let Some(position) = self.order.iter().position(|p| *p == pid) else {
            return false;
        };
        self.order.remove(position);

        self.cursor = match self.cursor {
            _ if self.order.is_empty() => None,
            Some(c) if position < c => Some(c - 1),
            Some(c) if position == c => Some(c.checked_sub(1).unwrap_or(self.order.len() - 1)),
            other => other,
        };
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.order.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(index: u32) -> ProcessId {
        ProcessId::new(index, 1)
    }

    #[test]
    fn advances_round_robin() {
        let mut queue = RunQueue::new();
        assert_eq!(queue.advance(), None);
        for i in 0..3 {
            queue.push_back(pid(i));
        }
        let order: Vec<_> = (0..7).filter_map(|_| queue.advance()).collect();
        assert_eq!(order, [0, 1, 2, 0, 1, 2, 0].map(pid));
    }

    #[test]
    fn removing_current_continues_with_successor() {
        let mut queue = RunQueue::new();
        for i in 0..3 {
            queue.push_back(pid(i));
        }
        assert_eq!(queue.advance(), Some(pid(0)));
        assert_eq!(queue.advance(), Some(pid(1)));
        assert!(queue.remove(pid(1)));
        assert_eq!(queue.advance(), Some(pid(2)));
        assert_eq!(queue.advance(), Some(pid(0)));
    }

    #[test]
    fn removing_head_under_cursor_wraps() {
        let mut queue = RunQueue::new();
        queue.push_back(pid(0));
        queue.push_back(pid(1));
        assert_eq!(queue.advance(), Some(pid(0)));
        queue.remove(pid(0));
        assert_eq!(queue.advance(), Some(pid(1)));
    }

    #[test]
    fn removing_before_cursor_keeps_position() {
        let mut queue = RunQueue::new();
        for i in 0..4 {
            queue.push_back(pid(i));
        }
        queue.advance();
        queue.advance();
        queue.advance();
        assert_eq!(queue.current(), Some(pid(2)));
        queue.remove(pid(0));
        assert_eq!(queue.current(), Some(pid(2)));
        assert_eq!(queue.advance(), Some(pid(3)));
    }

    #[test]
    fn removing_last_process_clears_cursor() {
        let mut queue = RunQueue::new();
        queue.push_back(pid(5));
        queue.advance();
        assert!(queue.remove(pid(5)));
        assert_eq!(queue.current(), None);
        assert!(!queue.remove(pid(5)));

        queue.push_back(pid(6));
        assert_eq!(queue.advance(), Some(pid(6)));
    }

    #[test]
    fn re_enqueued_process_goes_to_the_tail() {
        let mut queue = RunQueue::new();
        queue.push_back(pid(0));
        queue.push_back(pid(1));
        queue.remove(pid(0));
        queue.push_back(pid(0));
        queue.push_back(pid(0));
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![pid(1), pid(0)]);
    }
}
