//! # User Window Mapping
//!
//! All processes share one virtual window of a single 2 MiB page at
//! [`USER_WINDOW_BASE`]. Switching processes rewrites that one PDE to the
//! physical address of the next process page and flushes the TLB entry.
//!
//! ```text
//! PML4[0] ──► PDPT[1] ──► PD[0] ──► 2 MiB process page (PS=1, U/S=1)
//!               │
//!               └─ 0x4000_0000 .. 0x4020_0000
//! ```
//!
//! The loader leaves the active PML4 reachable through the HHDM. If it
//! already has a PDPT at `PML4[0]` (low identity map) that table is reused
//! and only its second slot is replaced.
//!
//! Process pages come from the kernel heap, which lives inside the kernel
//! image, so their physical address follows from the link-time relation
//! `PA = PHYS_LOAD + (VA - KERNEL_BASE)`.

use bitfield_struct::bitfield;
use core::arch::asm;
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use kernel_info::memory::{HHDM_BASE, HUGE_PAGE_SIZE, USER_WINDOW_BASE, kernel_va_to_pa};

const ENTRIES: usize = 512;

#[allow(clippy::cast_possible_truncation)]
const PML4_SLOT: usize = ((USER_WINDOW_BASE >> 39) & 0x1ff) as usize;
#[allow(clippy::cast_possible_truncation)]
const PDPT_SLOT: usize = ((USER_WINDOW_BASE >> 30) & 0x1ff) as usize;
#[allow(clippy::cast_possible_truncation)]
const PD_SLOT: usize = ((USER_WINDOW_BASE >> 21) & 0x1ff) as usize;

const _: () = assert!(USER_WINDOW_BASE.is_multiple_of(HUGE_PAGE_SIZE));

/// Non-leaf entry of any level (PML4E, PDPTE, PDE with `PS = 0`).
#[bitfield(u64)]
struct TableEntry {
    present: bool,
    writable: bool,
    user: bool,
    write_through: bool,
    cache_disable: bool,
    accessed: bool,
    #[bits(1)]
    __ignored6: u8,
    /// Must be 0 for a table pointer.
    page_size: bool,
    #[bits(4)]
    __ignored8_11: u8,
    /// Next-level table physical address (bits 12..51).
    #[bits(40)]
    phys_addr_51_12: u64,
    #[bits(11)]
    __available52_62: u16,
    no_execute: bool,
}

impl TableEntry {
    const fn user_table(phys: u64) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(true)
            .with_phys_addr_51_12(phys >> 12)
    }

    const fn phys(self) -> u64 {
        self.phys_addr_51_12() << 12
    }
}

/// PDE mapping a 2 MiB page (`PS = 1`).
#[bitfield(u64)]
struct Pde2M {
    present: bool,
    writable: bool,
    user: bool,
    write_through: bool,
    cache_disable: bool,
    accessed: bool,
    dirty: bool,
    #[bits(default = true)]
    page_size: bool,
    global: bool,
    #[bits(3)]
    __available9_11: u8,
    pat_large: bool,
    #[bits(8)]
    __reserved13_20: u8,
    /// Physical address bits 21..51.
    #[bits(31)]
    phys_addr_51_21: u32,
    #[bits(11)]
    __available52_62: u16,
    no_execute: bool,
}

impl Pde2M {
    #[allow(clippy::cast_possible_truncation)]
    const fn user_page(phys: u64) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(true)
            .with_page_size(true)
            .with_phys_addr_51_21((phys >> 21) as u32)
    }
}

#[repr(C, align(4096))]
struct Table(UnsafeCell<[u64; ENTRIES]>);

// SAFETY: single core; only touched with interrupts suppressed.
unsafe impl Sync for Table {}

impl Table {
    const fn new() -> Self {
        Self(UnsafeCell::new([0; ENTRIES]))
    }

    fn phys(&self) -> u64 {
        kernel_va_to_pa(self.0.get() as u64)
    }

    fn entries(&self) -> *mut u64 {
        self.0.get().cast()
    }
}

/// Used when the loader has no PDPT at `PML4[0]`.
static USER_PDPT: Table = Table::new();
static USER_PD: Table = Table::new();

/// Physical to HHDM virtual.
const fn phys_to_virt(pa: u64) -> *mut u64 {
    (HHDM_BASE + pa) as *mut u64
}

fn read_cr3() -> u64 {
    let cr3: u64;
    unsafe {
        asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
    }
    cr3 & !0xfff
}

fn flush_window() {
    unsafe {
        asm!("invlpg [{}]", in(reg) USER_WINDOW_BASE, options(nostack, preserves_flags));
    }
}

/// Hooks the user window's page directory into the active address space.
///
/// # Safety
/// Call once during bring-up. The HHDM must cover the active PML4 and, if
/// present, the PDPT at `PML4[0]`.
pub unsafe fn init() {
    let pml4 = phys_to_virt(read_cr3());
    let pml4e = unsafe { pml4.add(PML4_SLOT) };

    let existing = TableEntry::from_bits(unsafe { pml4e.read_volatile() });
    let pdpt = if existing.present() && !existing.page_size() {
        unsafe { pml4e.write_volatile(existing.with_user(true).with_writable(true).into_bits()) };
        phys_to_virt(existing.phys())
    } else {
        unsafe { pml4e.write_volatile(TableEntry::user_table(USER_PDPT.phys()).into_bits()) };
        USER_PDPT.entries()
    };

    unsafe {
        pdpt.add(PDPT_SLOT)
            .write_volatile(TableEntry::user_table(USER_PD.phys()).into_bits());
        USER_PD.entries().add(PD_SLOT).write_volatile(0);
        // Drops any stale 1 GiB translation of the replaced slot.
        asm!("mov cr3, {}", in(reg) read_cr3(), options(nostack, preserves_flags));
    }

    log::debug!(
        "user window at {USER_WINDOW_BASE:#x}, PD at {:#x}, reused loader PDPT: {}",
        USER_PD.phys(),
        existing.present()
    );
}

/// Maps the process page `page` (a kernel heap address) at the user window.
///
/// Call with interrupts suppressed.
pub fn map_user_page(page: NonNull<u8>) {
    let phys = kernel_va_to_pa(page.as_ptr() as u64);
    debug_assert!(phys.is_multiple_of(HUGE_PAGE_SIZE), "process page {phys:#x} not 2 MiB aligned");

    unsafe {
        USER_PD
            .entries()
            .add(PD_SLOT)
            .write_volatile(Pde2M::user_page(phys).into_bits());
    }
    flush_window();
}
