//! # 8259 Programmable Interrupt Controllers
//!
//! The primary/secondary pair is remapped so IRQ 0..16 arrive on vectors
//! [`IRQ_BASE`]`..`[`IRQ_END`], clear of the CPU exceptions.

use crate::ports::{inb, io_wait, outb};
use kernel_sched::trap::{IRQ_BASE, IRQ_END};

const PRIMARY_CMD: u16 = 0x20;
const PRIMARY_DATA: u16 = 0x21;
const SECONDARY_CMD: u16 = 0xA0;
const SECONDARY_DATA: u16 = 0xA1;

/// ICW1: edge triggered, cascade, ICW4 follows.
const ICW1_INIT: u8 = 0x11;
/// ICW4: 8086 mode.
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// IRQ line of the secondary controller on the primary.
const CASCADE_LINE: u8 = 2;

pub const TIMER_LINE: u8 = 0;
pub const KEYBOARD_LINE: u8 = 1;

const _: () = assert!(IRQ_END - IRQ_BASE == 16);

/// Remaps both controllers and masks every line.
///
/// # Safety
/// Call once during bring-up with interrupts masked.
pub unsafe fn init() {
    unsafe {
        outb(PRIMARY_CMD, ICW1_INIT);
        io_wait();
        outb(SECONDARY_CMD, ICW1_INIT);
        io_wait();

        outb(PRIMARY_DATA, IRQ_BASE);
        io_wait();
        outb(SECONDARY_DATA, IRQ_BASE + 8);
        io_wait();

        outb(PRIMARY_DATA, 1 << CASCADE_LINE);
        io_wait();
        outb(SECONDARY_DATA, CASCADE_LINE);
        io_wait();

        outb(PRIMARY_DATA, ICW4_8086);
        io_wait();
        outb(SECONDARY_DATA, ICW4_8086);
        io_wait();

        outb(PRIMARY_DATA, 0xFF & !(1 << CASCADE_LINE));
        outb(SECONDARY_DATA, 0xFF);
    }
    log::debug!("PIC remapped to {IRQ_BASE:#04x}..{IRQ_END:#04x}");
}

/// Lets `line` through.
pub fn unmask(line: u8) {
    let (port, bit) = mask_port(line);
    unsafe {
        let mask = inb(port);
        outb(port, mask & !(1 << bit));
    }
}

fn mask_port(line: u8) -> (u16, u8) {
    if line < 8 {
        (PRIMARY_DATA, line)
    } else {
        (SECONDARY_DATA, line - 8)
    }
}

/// Acknowledges `line`. Lines of the secondary controller need both.
pub fn end_of_interrupt(line: u8) {
    unsafe {
        if line >= 8 {
            outb(SECONDARY_CMD, EOI);
        }
        outb(PRIMARY_CMD, EOI);
    }
}
