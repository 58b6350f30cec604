//! # Bring-up
//!
//! The loader jumps to [`_start_kernel`] in long mode with the kernel mapped
//! at `KERNEL_BASE` and physical memory visible through the HHDM. From there:
//!
//! 1. switch to [`BOOT_STACK`] and install the logger,
//! 2. hand the static heap arena to the block allocator,
//! 3. load TSS, GDT and IDT,
//! 4. remap the PIC and start the PIT,
//! 5. hook the user window into the page tables,
//! 6. create the [`Kernel`] with the init program on the console,
//! 7. unmask the timer and keyboard lines and enter the idle loop.
//!
//! The boot stack is abandoned at step 7; it is never returned to.

use crate::console::{CONSOLE_TERMINAL, DebugConsole};
use crate::tss::Stack;
use crate::{HEAP, gdt, idle, idt, keyboard, pic, pit, programs, tss, vmem};
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::config::{KERNEL_HEAP_SIZE, LOG_LEVEL, TIMER_HZ};
use kernel_qemu::{QemuLogger, qemu_trace};
use kernel_sched::Kernel;
use kernel_sync::{IrqCell, SyncOnceCell};
use log::{debug, error, info};

/// Stack of the bring-up code.
pub const BOOT_STACK_SIZE: usize = 64 * 1024;

#[unsafe(link_section = ".bss.boot")]
static BOOT_STACK: Stack<BOOT_STACK_SIZE> = Stack::new();

const _: () = assert!(BOOT_STACK_SIZE.is_multiple_of(16));

/// Backing memory of the block allocator. Process pages are carved out of
/// it, so it must be mapped like the rest of the image.
#[repr(C, align(4096))]
struct HeapArena(UnsafeCell<[u8; KERNEL_HEAP_SIZE]>);

// SAFETY: handed to the allocator exactly once; never touched directly again.
unsafe impl Sync for HeapArena {}

static HEAP_ARENA: HeapArena = HeapArena(UnsafeCell::new([0; KERNEL_HEAP_SIZE]));

static LOGGER: QemuLogger = QemuLogger::new(LOG_LEVEL);

/// Mirror of the scheduler clock for log timestamps, readable without the
/// kernel lock.
static UPTIME_MS: AtomicU64 = AtomicU64::new(0);

static KERNEL: SyncOnceCell<IrqCell<Kernel<DebugConsole>>> = SyncOnceCell::new();

/// How often the heap and process summary is logged.
const HEARTBEAT_MS: u64 = 10_000;

/// The scheduler, once bring-up has created it.
pub fn kernel() -> Option<&'static IrqCell<Kernel<DebugConsole>>> {
    KERNEL.get()
}

/// Called from the timer interrupt.
pub fn publish_uptime(ms: u64) {
    UPTIME_MS.store(ms, Ordering::Relaxed);
}

fn uptime_ms() -> u64 {
    UPTIME_MS.load(Ordering::Relaxed)
}

/// The kernel entry point.
///
/// Naked so nothing touches the loader's stack before we replace it. The
/// `call` leaves `RSP % 16 == 8` at the Rust entry, as the ABI expects.
#[unsafe(no_mangle)]
#[unsafe(naked)]
#[unsafe(link_section = ".text._start_kernel")]
pub extern "C" fn _start_kernel() -> ! {
    core::arch::naked_asm!(
        "cli",
        "lea rsp, [rip + {stack}]",
        "add rsp, {size}",
        "xor ebp, ebp",
        "call {entry}",
        "ud2",
        stack = sym BOOT_STACK,
        size = const BOOT_STACK_SIZE,
        entry = sym kernel_entry_on_boot_stack,
    );
}

extern "C" fn kernel_entry_on_boot_stack() -> ! {
    if let Err(e) = LOGGER.init() {
        qemu_trace!("{e}\n");
    }
    LOGGER.set_clock(uptime_ms);
    info!("kernel starting");

    init_heap();

    unsafe {
        let tss = tss::init();
        gdt::init(tss);
        idt::init();
        pic::init();
        pit::init(TIMER_HZ);
        vmem::init();
    }

    let mut kernel = Kernel::new(&HEAP, DebugConsole::new(), programs::all());
    kernel.set_input_work(keyboard::drain);
    kernel.register_periodic(HEARTBEAT_MS, heartbeat);
    match kernel.spawn(programs::INIT, CONSOLE_TERMINAL) {
        Ok(pid) => info!("{} started as {pid}", programs::INIT),
        Err(e) => error!("cannot start {}: {e}", programs::INIT),
    }
    if KERNEL.set(IrqCell::new(kernel)).is_err() {
        panic!("kernel initialized twice");
    }

    pic::unmask(pic::TIMER_LINE);
    pic::unmask(pic::KEYBOARD_LINE);
    info!("entering scheduler");
    idle::enter()
}

fn init_heap() {
    let Some(region) = NonNull::new(HEAP_ARENA.0.get().cast::<u8>()) else {
        unreachable!("statics are never null");
    };
    match unsafe { HEAP.init(region, KERNEL_HEAP_SIZE) } {
        Ok(stats) => info!(
            "heap: {} KiB in {} blocks",
            KERNEL_HEAP_SIZE / 1024,
            stats.total_blocks
        ),
        Err(e) => panic!("heap initialization failed: {e}"),
    }
}

/// Periodic work: a one-line summary of memory and processes.
fn heartbeat() {
    let usage = HEAP.usage();
    let processes = kernel().map_or(0, |k| k.lock().process_count());
    debug!(
        "heartbeat: {processes} processes, {}/{} blocks used in {} allocations",
        usage.used_blocks, usage.total_blocks, usage.allocations
    );
}
