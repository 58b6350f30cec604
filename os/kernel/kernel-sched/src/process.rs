//! Process records.

use crate::console::TerminalId;
use crate::trap::{GeneralRegisters, TrapFrame};
use core::fmt;
use core::ptr::NonNull;
use kernel_info::memory::{USER_ENTRY, USER_STACK_TOP, USER_WINDOW_BASE};
use kernel_alloc::HUGE_ALLOC_SIZE;
use kernel_sync::irq::RFLAGS_IF;

/// `RFLAGS` a new process starts with: `IF` plus the always-one bit 1.
pub const USER_RFLAGS: u64 = RFLAGS_IF | 0x2;

/// Stable handle of a process: arena slot plus the slot's generation.
///
/// Handles of terminated processes never match a later occupant of the same
/// slot. The raw form handed to user space is never zero.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId {
    index: u32,
    generation: u32,
}

impl ProcessId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Encoding used in syscall registers.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Decodes a syscall register; `None` for values no handle can produce.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        let generation = (raw >> 32) as u32;
        if generation == 0 {
            return None;
        }
        Some(Self::new(raw as u32, generation))
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid{}.{}", self.index, self.generation)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a process left the run queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Waiting for a line on its terminal.
    ReadLine,
    /// Waiting for the given process to terminate.
    Wait(ProcessId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// In the run queue, not loaded.
    Runnable,
    /// Loaded into the CPU.
    Running,
    /// Out of the run queue until its event arrives.
    Blocked(BlockReason),
}

/// Everything needed to resume a process.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    pub gpr: GeneralRegisters,
    pub rip: u64,
    pub rsp: u64,
    pub rflags: u64,
}

impl Registers {
    /// Initial state of a freshly loaded image.
    #[must_use]
    pub fn at_entry() -> Self {
        Self {
            gpr: GeneralRegisters::default(),
            rip: USER_ENTRY,
            rsp: USER_STACK_TOP,
            rflags: USER_RFLAGS,
        }
    }

    /// Copies the interrupted user state out of a trap frame.
    #[must_use]
    pub const fn capture(frame: &TrapFrame) -> Self {
        Self {
            gpr: frame.gpr,
            rip: frame.rip,
            rsp: frame.rsp,
            rflags: frame.rflags,
        }
    }
}

/// A live process.
pub struct Process {
    pub(crate) name: &'static str,
    pub(crate) regs: Registers,
    pub(crate) terminal: TerminalId,
    pub(crate) page: NonNull<u8>,
    pub(crate) waiter: Option<ProcessId>,
    pub(crate) state: ProcessState,
    pub(crate) dispatches: u64,
}

// SAFETY: the page is owned exclusively by this record.
unsafe impl Send for Process {}

impl Process {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.regs
    }

    #[must_use]
    pub const fn terminal(&self) -> TerminalId {
        self.terminal
    }

    /// Kernel address of the process page.
    #[must_use]
    pub const fn page(&self) -> NonNull<u8> {
        self.page
    }

    /// Process blocked in `wait` on this one, if any.
    #[must_use]
    pub const fn waiter(&self) -> Option<ProcessId> {
        self.waiter
    }

    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// How often the process has been loaded into the CPU.
    #[must_use]
    pub const fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// The whole page as seen through the user window.
    #[must_use]
    pub fn memory(&self) -> &[u8] {
        // SAFETY: the page is a live huge allocation owned by this record.
        unsafe { core::slice::from_raw_parts(self.page.as_ptr(), HUGE_ALLOC_SIZE) }
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes the access exclusive.
        unsafe { core::slice::from_raw_parts_mut(self.page.as_ptr(), HUGE_ALLOC_SIZE) }
    }

    /// Bytes `[va, va + len)` of the user window, if entirely inside it.
    #[must_use]
    pub fn user_bytes(&self, va: u64, len: u64) -> Option<&[u8]> {
        let range = window_range(va, len)?;
        Some(&self.memory()[range])
    }

    pub fn user_bytes_mut(&mut self, va: u64, len: u64) -> Option<&mut [u8]> {
        let range = window_range(va, len)?;
        Some(&mut self.memory_mut()[range])
    }

    /// NUL-terminated string at `va`, without the terminator.
    ///
    /// `None` if `va` is outside the window or no NUL follows before its end.
    #[must_use]
    pub fn user_str(&self, va: u64) -> Option<&[u8]> {
        let start = window_range(va, 0)?.start;
        let tail = &self.memory()[start..];
        let len = tail.iter().position(|b| *b == 0)?;
        Some(&tail[..len])
    }
}

fn window_range(va: u64, len: u64) -> Option<core::ops::Range<usize>> {
    let offset = usize::try_from(va.checked_sub(USER_WINDOW_BASE)?).ok()?;
    let end = offset.checked_add(usize::try_from(len).ok()?)?;
    (offset <= HUGE_ALLOC_SIZE && end <= HUGE_ALLOC_SIZE).then_some(offset..end)
}
