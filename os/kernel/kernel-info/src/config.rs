//! # Tunables

use log::LevelFilter;

/// Allocation granule of the kernel block allocator.
pub const BLOCK_SIZE: usize = 128;

/// Size and alignment of a huge allocation (one process address space).
pub const HUGE_ALLOC_SIZE: usize = crate::memory::HUGE_PAGE_SIZE as usize;

/// Size of the static arena handed to the block allocator at boot.
///
/// Holds the block map, up to 2 MiB of alignment padding, kernel heap
/// objects and every live process page.
pub const KERNEL_HEAP_SIZE: usize = 24 * 1024 * 1024;

/// Frequency of the periodic timer interrupt.
pub const TIMER_HZ: u32 = 1000;

/// Minimum run time before the timer takes the CPU away from a process.
pub const PREEMPT_INTERVAL_MS: u64 = 2;

/// Initial number of slots in the deferred work queue.
pub const WORK_QUEUE_CAPACITY: usize = 64;

/// Bytes at the top of each process page kept free of program image.
pub const USER_STACK_RESERVE: usize = 64 * 1024;

/// Longest line the console buffers. Further characters are dropped, not
/// echoed, until the line is finished with enter.
pub const MAX_LINE_LEN: usize = 256;

/// Log level installed at boot.
pub const LOG_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};

const _: () = {
    assert!(BLOCK_SIZE.is_power_of_two());
    assert!(HUGE_ALLOC_SIZE.is_multiple_of(BLOCK_SIZE));
    assert!(KERNEL_HEAP_SIZE > 2 * HUGE_ALLOC_SIZE);
    assert!(USER_STACK_RESERVE < HUGE_ALLOC_SIZE);
    assert!(TIMER_HZ >= 1000 / PREEMPT_INTERVAL_MS as u32);
};
