use crate::process::{Process, ProcessId};
use alloc::vec::Vec;

enum Slot {
    Occupied { generation: u32, process: Process },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Arena of live processes with a free list of vacant slots.
#[derive(Default)]
pub struct ProcessTable {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    len: usize,
}

impl ProcessTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
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

    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, process: Process) -> ProcessId {
        self.len += 1;
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let Slot::Vacant { generation, next_free } = *slot else {
                unreachable!("free list points at an occupied slot");
            };
            self.free_head = next_free;
            *slot = Slot::Occupied { generation, process };
            return ProcessId::new(index, generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 1,
            process,
        });
        ProcessId::new(index, 1)
    }

    /// Frees the slot of `pid` and returns its process.
    #[allow(clippy::cast_possible_truncation)]
    pub fn remove(&mut self, pid: ProcessId) -> Option<Process> {
        let slot = self.slots.get_mut(pid.index())?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == pid.generation() => {}
            _ => return None,
        }

        let next_generation = pid.generation().wrapping_add(1).max(1);
        let vacant = Slot::Vacant {
            generation: next_generation,
            next_free: self.free_head,
        };
        let Slot::Occupied { process, .. } = core::mem::replace(slot, vacant) else {
            return None;
        };
        self.free_head = Some(pid.index() as u32);
        self.len -= 1;
        Some(process)
    }

    #[must_use]
    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        match self.slots.get(pid.index())? {
            Slot::Occupied { generation, process } if *generation == pid.generation() => Some(process),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        match self.slots.get_mut(pid.index())? {
            Slot::Occupied { generation, process } if *generation == pid.generation() => Some(process),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, pid: ProcessId) -> bool {
        self.get(pid).is_some()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (ProcessId, &Process)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, process } => {
                    Some((ProcessId::new(index as u32, *generation), process))
                }
                Slot::Vacant { .. } => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::TerminalId;
    use crate::process::{ProcessState, Registers};
    use core::ptr::NonNull;

    fn process(name: &'static str) -> Process {
        Process {
            name,
            regs: Registers::at_entry(),
            terminal: TerminalId(0),
            page: NonNull::dangling(),
            waiter: None,
            state: ProcessState::Runnable,
            dispatches: 0,
        }
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut table = ProcessTable::new();
        let a = table.insert(process("a"));
        assert_eq!(table.get(a).map(Process::name), Some("a"));

        assert!(table.remove(a).is_some());
        assert!(table.get(a).is_none());
        assert!(table.remove(a).is_none());

        let b = table.insert(process("b"));
        assert_eq!(a.index(), b.index(), "slot is reused");
        assert_ne!(a, b);
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b).map(Process::name), Some("b"));
    }

    #[test]
    fn iter_yields_only_live_processes() {
        let mut table = ProcessTable::new();
        let ids: Vec<_> = ["a", "b", "c"].into_iter().map(|n| table.insert(process(n))).collect();
        table.remove(ids[1]);
        let names: Vec<_> = table.iter().map(|(_, p)| p.name()).collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(table.len(), 2);
    }
}
