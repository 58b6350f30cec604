//! # Kernel Layout and Tunables
//!
//! Compile-time constants shared by the kernel, its library crates and the
//! build script.
//!
//! ```text
//! 0x0000_0000_4000_0000 ┌─────────────────────────────────┐ USER_WINDOW_BASE
//!                       │  user window: one 2 MiB page    │
//!                       │  image at the base, stack below │
//!                       │  the top                        │
//! 0x0000_0000_4020_0000 ├─────────────────────────────────┤
//!                       │           unmapped              │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │  higher half direct mapping     │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │  kernel text, data, heap arena  │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! * [`memory`]: where things live.
//! * [`config`]: how the scheduler, timer and allocator are tuned.
//! * [`segments`]: GDT selectors.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod config;
pub mod memory;
pub mod segments;
