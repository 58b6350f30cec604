//! # 8253/8254 Programmable Interval Timer
//!
//! Channel 0 drives IRQ 0, the scheduler's clock.

use crate::ports::outb;

const CHANNEL0: u16 = 0x40;
const COMMAND: u16 = 0x43;
/// Input clock of the PIT.
const PIT_FREQ: u32 = 1_193_182;
/// Channel 0, lobyte/hibyte access, mode 2 (rate generator).
const MODE_RATE_GENERATOR: u8 = 0x34;

/// Reload value for `hz` interrupts per second.
#[allow(clippy::cast_possible_truncation)]
const fn divisor(hz: u32) -> u16 {
    let d = PIT_FREQ / hz;
    if d > 0xFFFF { 0xFFFF } else { d as u16 }
}

const _: () = assert!(divisor(1000) == 1193);

/// Starts channel 0 at `hz`.
///
/// # Safety
/// Call with interrupts masked.
pub unsafe fn init(hz: u32) {
    let [lo, hi] = divisor(hz).to_le_bytes();
    unsafe {
        outb(COMMAND, MODE_RATE_GENERATOR);
        outb(CHANNEL0, lo);
        outb(CHANNEL0, hi);
    }
    log::debug!("PIT running at {hz} Hz");
}
