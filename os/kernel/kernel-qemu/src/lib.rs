//! # QEMU debug port output
//!
//! Everything written here ends up on QEMU's `-debugcon` device (I/O port
//! `0x402`), which needs no initialization and works from the first
//! instruction of the kernel:
//!
//! ```bash
//! qemu-system-x86_64 -kernel kernel.elf -debugcon stdio
//! ```
//!
//! * [`qemu_trace!`] formats straight to the port, for early boot and for
//!   paths that must not go through the logger.
//! * [`QemuLogger`] is a `log::Log` backend on top of the same port.
//!
//! Without the `enabled` feature both compile to no-ops.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::{LoggerError, QemuLogger};

/// The port number of QEMU's debug console.
pub const QEMU_DEBUG_PORT: u16 = 0x402;

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// Write a single byte to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") super::QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            s.bytes().for_each(dbg_putc);
            Ok(())
        }
    }

    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort output.
        let _ = fmt::write(&mut QemuSink, args);
    }

    /// Raw bytes, e.g. terminal output that is not valid UTF-8.
    #[inline]
    pub fn qemu_write_bytes(bytes: &[u8]) {
        bytes.iter().copied().for_each(dbg_putc);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn qemu_write(_: fmt::Arguments) {}

    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn qemu_write_bytes(_: &[u8]) {}
}

pub use qemu_fmt::qemu_write_bytes;

/// `print!` to the QEMU debug port.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
