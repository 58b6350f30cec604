//! # 64-bit Task State Segment
//!
//! Only two fields matter here: `rsp0`, the stack every trap from ring 3
//! lands on, and `ist1`, a separate stack for double faults.

use core::cell::UnsafeCell;
use kernel_info::memory::KERNEL_STACK_SIZE;

#[repr(C, packed)]
pub struct Tss64 {
    _reserved0: u32,
    pub rsp0: u64,
    pub rsp1: u64,
    pub rsp2: u64,
    _reserved1: u64,
    pub ist: [u64; 7],
    _reserved2: u64,
    _reserved3: u16,
    /// Offset of the I/O permission bitmap; pointing past the end disables it.
    pub iopb_offset: u16,
}

const _: () = assert!(size_of::<Tss64>() == 104);

impl Tss64 {
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new() -> Self {
        Self {
            _reserved0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            _reserved1: 0,
            ist: [0; 7],
            _reserved2: 0,
            _reserved3: 0,
            iopb_offset: size_of::<Self>() as u16,
        }
    }
}

/// Statically allocated stack of `N` bytes.
#[repr(C, align(16))]
pub struct Stack<const N: usize>(UnsafeCell<[u8; N]>);

// SAFETY: only ever used as raw stack memory by the CPU.
unsafe impl<const N: usize> Sync for Stack<N> {}

impl<const N: usize> Stack<N> {
    pub const fn new() -> Self {
        Self(UnsafeCell::new([0; N]))
    }

    /// One past the highest byte, 16-byte aligned.
    pub fn top(&self) -> u64 {
        self.0.get().cast::<u8>().wrapping_add(N) as u64
    }
}

/// Interrupt stack table slot used by the double fault gate.
pub const DOUBLE_FAULT_IST: u8 = 1;

struct TssCell(UnsafeCell<Tss64>);

// SAFETY: written once during single-threaded bring-up, then only read by the CPU.
unsafe impl Sync for TssCell {}

static TSS: TssCell = TssCell(UnsafeCell::new(Tss64::new()));

/// Ring-0 stack for traps out of user mode.
static TRAP_STACK: Stack<KERNEL_STACK_SIZE> = Stack::new();

/// Separate stack for `#DF`.
static DOUBLE_FAULT_STACK: Stack<KERNEL_STACK_SIZE> = Stack::new();

/// Fills in the stack pointers and returns the TSS for the GDT descriptor.
///
/// # Safety
/// Call once during bring-up, before the TSS is loaded.
pub unsafe fn init() -> &'static Tss64 {
    let tss = unsafe { &mut *TSS.0.get() };
    tss.rsp0 = TRAP_STACK.top();
    tss.ist[usize::from(DOUBLE_FAULT_IST - 1)] = DOUBLE_FAULT_STACK.top();
    tss
}
