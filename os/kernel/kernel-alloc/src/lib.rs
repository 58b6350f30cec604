//! # Kernel Block Allocator
//!
//! Every byte of dynamic memory in the kernel, from small heap objects to the
//! 2 MiB pages that serve as whole process address spaces, comes out of one
//! fixed region managed by a [`BlockAllocator`].
//!
//! ```text
//! region ┌────────────┬─────────┬──────────────────────────────────────┐
//!        │ block map  │ padding │ heap: BLOCK_SIZE blocks              │
//!        └────────────┴─────────┴──────────────────────────────────────┘
//!                               ^ heap base, 2 MiB aligned
//! ```
//!
//! The map stores two bits per block ([`BlockState`]): a free block is `00`,
//! an allocation is a run of `PART` (`11`) blocks terminated by one `END`
//! (`10`) block. Releasing only needs the start pointer: walk forward clearing
//! `PART` blocks until the `END` block.
//!
//! Allocation is first-fit. Huge allocations additionally require their first
//! block to sit on a 2 MiB boundary relative to the heap base.
//!
//! [`KernelHeap`] wraps the allocator in an [`IrqCell`](kernel_sync::IrqCell),
//! so every operation runs with interrupts suppressed, and implements
//! [`GlobalAlloc`](core::alloc::GlobalAlloc) on top of it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod block_alloc;
mod block_map;
mod heap;

pub use block_alloc::{AllocError, BlockAllocator, HEAP_BASE_ALIGN, HeapStats, HeapUsage};
pub use block_map::BlockState;
pub use heap::KernelHeap;
pub use kernel_info::config::{BLOCK_SIZE, HUGE_ALLOC_SIZE};

/// Number of blocks needed to hold `bytes`.
#[inline]
#[must_use]
pub const fn blocks_for(bytes: usize) -> usize {
    bytes.div_ceil(BLOCK_SIZE)
}
