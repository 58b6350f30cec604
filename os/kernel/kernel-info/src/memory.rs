//! # Memory Layout

/// Size of a process page, the only unit of user address space.
pub const HUGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

/// Virtual address at which the running process's page is mapped.
///
/// Sits in the second GiB so the window owns a PML4 slot, PDPT slot and PD
/// slot of its own.
pub const USER_WINDOW_BASE: u64 = 0x0000_0000_4000_0000;

/// First address past the user window.
pub const USER_WINDOW_END: u64 = USER_WINDOW_BASE + HUGE_PAGE_SIZE;

/// Where execution of a freshly spawned program begins: the first byte of its image.
pub const USER_ENTRY: u64 = USER_WINDOW_BASE;

/// Initial user stack pointer, 16-byte aligned and just below the window top.
pub const USER_STACK_TOP: u64 = USER_WINDOW_END - 16;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel executes (VMA), matches the linker script.
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Where the kernel image sits in *physical* memory (LMA).
///
/// 2 MiB aligned like [`KERNEL_BASE`], so kernel virtual and physical
/// addresses agree modulo [`HUGE_PAGE_SIZE`]. Process pages carved out of the
/// kernel heap can then be mapped as single huge pages.
pub const PHYS_LOAD: u64 = 0x0020_0000;

/// The size of the ring-0 stack used for traps from user mode.
pub const KERNEL_STACK_SIZE: usize = 32 * 1024;

/// The size of the stack the idle loop runs on.
pub const IDLE_STACK_SIZE: usize = 32 * 1024;

/// Translates a kernel image address into its physical address.
#[inline]
#[must_use]
pub const fn kernel_va_to_pa(va: u64) -> u64 {
    PHYS_LOAD + (va - KERNEL_BASE)
}

/// Whether `va` lies inside the user window.
#[inline]
#[must_use]
pub const fn is_user_address(va: u64) -> bool {
    va >= USER_WINDOW_BASE && va < USER_WINDOW_END
}

const _: () = {
    assert!(KERNEL_STACK_SIZE.is_multiple_of(4096));
    assert!(IDLE_STACK_SIZE.is_multiple_of(4096));
    assert!(USER_WINDOW_BASE.is_multiple_of(HUGE_PAGE_SIZE));
    assert!(KERNEL_BASE.is_multiple_of(HUGE_PAGE_SIZE));
    assert!(PHYS_LOAD.is_multiple_of(HUGE_PAGE_SIZE));
    assert!(USER_STACK_TOP.is_multiple_of(16));
    assert!(KERNEL_BASE > HHDM_BASE);
};
