//! # x86 I/O Port Access
//!
//! Byte-wide `in`/`out` for the legacy devices this kernel drives:
//!
//! ```text
//! 0x0020-0x0021   PIC primary
//! 0x0040-0x0043   PIT
//! 0x0060          PS/2 keyboard data
//! 0x0080          POST code, used as an I/O delay
//! 0x00A0-0x00A1   PIC secondary
//! ```

/// Write one byte to an I/O port (x86).
///
/// Low-level helper for devices that live in the legacy **I/O port space**
/// (not MMIO). Uses `out dx, al`.
///
/// # Safety
/// You must uphold **all** of the following:
/// - **Privilege:** Execute at CPL0 **or** have I/O permission (IOPL/IO bitmap)
///   that allows access to `port`. Otherwise the CPU raises `#GP`.
/// - **Correct port:** `port` must belong to the intended device and be in a
///   valid state for this write. Writing the wrong port or wrong value can wedge
///   the device or the system (e.g., disabling the PIC, reprogramming timers).
/// - **Device presence:** The target device must exist and be decoded on the
///   bus. Some platforms hang on accesses to nonexistent ports.
/// - **Concurrency:** Multi-byte device protocols (PIC init words, PIT
///   divisor) must not be interleaved with an interrupt handler touching the
///   same device.
/// - **Ordering:** `out` orders with respect to other I/O instructions to the
///   same device but is **not** a general memory fence. If you need ordering
///   with normal memory (e.g., MMIO buffers or shared memory), add an
///   appropriate compiler/CPU fence around calls.
/// - **Environment:** Only use on `x86/x86_64` with an I/O port bus. Never use
///   for **memory-mapped** devices (MMIO).
#[inline]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read one byte from an I/O port (x86).
///
/// Low-level helper for devices that live in the legacy **I/O port space**.
/// Uses `in al, dx`.
///
/// # Safety
/// You must uphold **all** of the following:
/// - **Privilege:** Execute at CPL0 **or** have I/O permission (IOPL/IO bitmap)
///   that allows access to `port`; otherwise the CPU raises `#GP`.
/// - **Correct port:** `port` must be a readable register of the intended
///   device; reading from the wrong port can yield undefined garbage or stall
///   the device’s protocol.
/// - **Device presence:** The target device must exist and be decoding the
///   address. Accesses to nonexistent ports may fault or hang on some systems.
/// - **Concurrency:** See [`outb`].
/// - **Ordering:** `in` orders with other I/O instructions but is **not** a
///   general memory fence. If you must order this read with normal memory
///   operations (e.g., reading a status port then consuming an MMIO buffer),
///   insert the appropriate compiler/CPU fence.
/// - **Environment:** Only for `x86/x86_64` I/O port space. Do not use for MMIO.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let mut v: u8;
    unsafe {
        core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Gives slow legacy devices time to settle between two writes.
#[inline]
pub fn io_wait() {
    unsafe { outb(0x80, 0) };
}
