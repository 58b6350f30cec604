//! # Kernel synchronization primitives
//!
//! Single-core primitives built on interrupt suppression.

#![cfg_attr(target_os = "none", no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod irq_cell;
mod sync_once_cell;

pub use irq::IrqGuard;
pub use irq_cell::{IrqCell, IrqCellGuard};
pub use sync_once_cell::SyncOnceCell;
