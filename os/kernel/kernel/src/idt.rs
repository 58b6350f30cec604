//! # Interrupt Descriptor Table
//!
//! All 256 vectors point at the uniform trampolines in
//! [`interrupts`](crate::interrupts). Gate type and DPL follow the vector's
//! [`TrapKind`]:
//!
//! ```ignore
//! idt[0x80]
//!     .set_handler(stub)
//!     .selector(KERNEL_CS)
//!     .dpl(3)              // allow ring-3 `int 0x80`
//!     .gate_type(GateKind::Interrupt)
//!     .present(true);
//! ```
//!
//! Load the GDT and TSS first: traps out of ring 3 switch to `tss.rsp0`, and
//! the double fault gate uses an IST slot.

use crate::interrupts::trap_stub;
use crate::tss::DOUBLE_FAULT_IST;
use bitfield_struct::bitfield;
use core::arch::asm;
use core::cell::UnsafeCell;
use core::ops::{Index, IndexMut};
use kernel_info::segments::KERNEL_CS;
use kernel_sched::trap::{GateKind, TrapKind};

const _: () = assert!(size_of::<IdtEntry>() == 16);
const _: () = assert!(align_of::<Idt>() == 16);

/// The `IST` and type/attribute bytes of a gate.
#[bitfield(u16)]
pub struct IdtGateAttr {
    /// Interrupt stack table slot, 0 for none.
    #[bits(3)]
    pub ist: u8,
    #[bits(5)]
    __zero0: u8,
    /// 0xE interrupt gate, 0xF trap gate.
    #[bits(4)]
    pub typ: u8,
    /// Must be 0 for gates.
    pub s: bool,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
}

#[repr(C, align(16))]
pub struct Idt {
    entries: [IdtEntry; 256],
}

impl Idt {
    pub const fn new() -> Self {
        Self {
            entries: [IdtEntry::MISSING; 256],
        }
    }

    /// Loads this table into the IDTR.
    ///
    /// # Safety
    /// Every present entry must point at valid handler code.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn load(&'static self) {
        let idtr = crate::gdt::DescTablePtr {
            limit: (size_of::<Self>() - 1) as u16,
            base: core::ptr::from_ref(self) as u64,
        };
        unsafe {
            asm!("lidt [{}]", in(reg) &raw const idtr, options(nostack, preserves_flags, readonly));
        }
    }
}

impl Index<usize> for Idt {
    type Output = IdtEntry;
    fn index(&self, i: usize) -> &Self::Output {
        &self.entries[i]
    }
}

impl IndexMut<usize> for Idt {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.entries[i]
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct IdtEntry {
    offset_lo: u16,
    selector: u16,
    attr: u16,
    offset_mid: u16,
    offset_hi: u32,
    zero: u32,
}

impl IdtEntry {
    pub const MISSING: Self = Self {
        offset_lo: 0,
        selector: 0,
        attr: IdtGateAttr::new().into_bits(),
        offset_mid: 0,
        offset_hi: 0,
        zero: 0,
    };

    /// Points the gate at `handler`. The gate stays non-present until the
    /// builder says otherwise.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_handler(&mut self, handler: u64) -> IdtEntryBuilder<'_> {
        self.offset_lo = handler as u16;
        self.offset_mid = (handler >> 16) as u16;
        self.offset_hi = (handler >> 32) as u32;
        self.attr = IdtGateAttr::new().with_typ(0xE).into_bits();
        IdtEntryBuilder { entry: self }
    }

    fn attr(&self) -> IdtGateAttr {
        IdtGateAttr::from_bits(self.attr)
    }
}

pub struct IdtEntryBuilder<'a> {
    entry: &'a mut IdtEntry,
}

impl IdtEntryBuilder<'_> {
    #[inline]
    pub fn present(self, p: bool) -> Self {
        self.entry.attr = self.entry.attr().with_present(p).into_bits();
        self
    }

    #[inline]
    pub fn dpl(self, dpl: u8) -> Self {
        debug_assert!(dpl <= 3);
        self.entry.attr = self.entry.attr().with_dpl(dpl).into_bits();
        self
    }

    #[inline]
    pub fn gate_type(self, gate: GateKind) -> Self {
        let typ = match gate {
            GateKind::Interrupt => 0xE,
            GateKind::Trap => 0xF,
        };
        self.entry.attr = self.entry.attr().with_typ(typ).with_s(false).into_bits();
        self
    }

    #[inline]
    pub fn ist(self, idx: u8) -> Self {
        debug_assert!(idx <= 7);
        self.entry.attr = self.entry.attr().with_ist(idx).into_bits();
        self
    }

    #[inline]
    pub const fn selector(self, sel: u16) -> Self {
        self.entry.selector = sel;
        self
    }
}

struct IdtCell(UnsafeCell<Idt>);

// SAFETY: filled once during single-threaded bring-up, then only read by the CPU.
unsafe impl Sync for IdtCell {}

static IDT: IdtCell = IdtCell(UnsafeCell::new(Idt::new()));

/// Fills every gate and loads the table.
///
/// # Safety
/// Call once during bring-up with interrupts masked, after the TSS is loaded.
pub unsafe fn init() {
    let idt = unsafe { &mut *IDT.0.get() };
    for vector in 0..=u8::MAX {
        let kind = TrapKind::classify(vector);
        let ist = if kind == TrapKind::DoubleFault { DOUBLE_FAULT_IST } else { 0 };
        idt[usize::from(vector)]
            .set_handler(trap_stub(vector))
            .selector(KERNEL_CS)
            .dpl(kind.dpl())
            .gate_type(kind.gate())
            .ist(ist)
            .present(true);
    }

    let idt: &'static Idt = idt;
    unsafe { idt.load() };
    log::debug!("IDT loaded");
}
