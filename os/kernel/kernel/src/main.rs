//! # Kernel Entry Point
//!
//! Brings up descriptor tables, the interrupt controllers and the heap, then
//! hands the CPU to the scheduler's idle loop. See [`init`] for the boot
//! sequence and [`interrupts`] for the trap path.

#![no_std]
#![no_main]
#![allow(unsafe_code)]

extern crate alloc;

mod console;
mod gdt;
mod idle;
mod idt;
mod init;
mod interrupts;
mod keyboard;
mod pic;
mod pit;
mod ports;
mod programs;
mod tss;
mod userland;
mod vmem;

use kernel_alloc::KernelHeap;

/// Every dynamic allocation of the kernel, process pages included.
#[global_allocator]
pub(crate) static HEAP: KernelHeap = KernelHeap::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kernel_sync::irq::disable();
    log::error!("kernel panic: {info}");
    loop {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack, preserves_flags)) };
    }
}
