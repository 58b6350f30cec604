//! # PS/2 Keyboard
//!
//! The interrupt handler only queues the raw scancode; decoding runs later
//! as deferred work in the idle loop.

use crate::console::CONSOLE_TERMINAL;
use crate::init;
use kernel_sync::IrqCell;
use log::{debug, warn};
use pc_keyboard::{DecodedKey, HandleControl, Keyboard, ScancodeSet1, layouts};

/// Data port of the PS/2 controller.
pub const DATA_PORT: u16 = 0x60;

const RING_SIZE: usize = 128;

/// Scancodes between the interrupt and the decoder.
struct ScancodeRing {
    buf: [u8; RING_SIZE],
    head: usize,
    len: usize,
}

impl ScancodeRing {
    const fn new() -> Self {
        Self {
            buf: [0; RING_SIZE],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, scancode: u8) -> bool {
        if self.len == RING_SIZE {
            return false;
        }
        self.buf[(self.head + self.len) % RING_SIZE] = scancode;
        self.len += 1;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let scancode = self.buf[self.head];
        self.head = (self.head + 1) % RING_SIZE;
        self.len -= 1;
        Some(scancode)
    }
}

static SCANCODES: IrqCell<ScancodeRing> = IrqCell::new(ScancodeRing::new());

static DECODER: IrqCell<Keyboard<layouts::Us104Key, ScancodeSet1>> = IrqCell::new(Keyboard::new(
    ScancodeSet1::new(),
    layouts::Us104Key,
    HandleControl::Ignore,
));

/// Called from the keyboard interrupt.
pub fn push_scancode(scancode: u8) {
    if !SCANCODES.lock().push(scancode) {
        warn!("scancode {scancode:#04x} dropped, ring full");
    }
}

/// Deferred work: decodes queued scancodes and feeds the console.
pub fn drain() {
    let Some(kernel) = init::kernel() else {
        return;
    };

    loop {
        let Some(scancode) = SCANCODES.lock().pop() else {
            break;
        };
        let key = {
            let mut decoder = DECODER.lock();
            match decoder.add_byte(scancode) {
                Ok(Some(event)) => decoder.process_keyevent(event),
                Ok(None) => None,
                Err(e) => {
                    debug!("bad scancode {scancode:#04x}: {e:?}");
                    None
                }
            }
        };
        let Some(DecodedKey::Unicode(c)) = key else {
            continue;
        };

        let mut k = kernel.lock();
        if let Some(line) = k.console_mut().push_key(c)
            && !k.deliver_line(CONSOLE_TERMINAL, &line)
        {
            debug!("no reader for line of {} bytes", line.len());
        }
    }
}
