//! # Segment Selectors
//!
//! GDT layout shared by the kernel's descriptor tables and the code that
//! builds user return frames.
//!
//! | index | selector | descriptor        |
//! |-------|----------|-------------------|
//! | 0     | `0x00`   | null              |
//! | 1     | `0x08`   | kernel code, DPL0 |
//! | 2     | `0x10`   | kernel data, DPL0 |
//! | 3     | `0x1b`   | user data, DPL3   |
//! | 4     | `0x23`   | user code, DPL3   |
//! | 5..6  | `0x28`   | 64-bit TSS        |

pub const KERNEL_CS: u16 = 0x08;
pub const KERNEL_DS: u16 = 0x10;
pub const USER_DS: u16 = 0x18 | 3;
pub const USER_CS: u16 = 0x20 | 3;
pub const TSS_SEL: u16 = 0x28;

/// Requested privilege level of a selector.
#[inline]
#[must_use]
pub const fn rpl(selector: u64) -> u8 {
    (selector & 0b11) as u8
}
