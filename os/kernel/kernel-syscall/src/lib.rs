//! # System call ABI
//!
//! User code enters the kernel with `int 0x80`:
//!
//! | register | meaning                      |
//! |----------|------------------------------|
//! | `rax`    | selector ([`Sysno`])         |
//! | `rdi`    | first argument               |
//! | `rsi`    | second argument              |
//! | `rdx`    | third argument               |
//!
//! The result comes back in `rax`; [`SYSCALL_ERROR`] signals failure. All
//! other registers are preserved.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod color;

pub use color::Color;

/// Software interrupt vector of the syscall gate.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Value returned in `rax` when a call fails.
pub const SYSCALL_ERROR: u64 = u64::MAX;

/// Syscall selectors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u64)]
pub enum Sysno {
    /// Terminate the calling process. Never returns.
    Exit = 0,
    /// Print a NUL-terminated string (`rdi`) in a color (`rsi`).
    Print = 2,
    /// Block until a line of input arrives; `rdi` = buffer, `rsi` = capacity.
    ReadLine = 3,
    /// Start the program named by the NUL-terminated string in `rdi`.
    /// Returns the new process id, or `0` if no such program exists.
    Spawn = 4,
    /// Block until process `rdi` has terminated.
    Wait = 5,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown syscall selector {0}")]
pub struct UnknownSyscall(pub u64);

impl TryFrom<u64> for Sysno {
    type Error = UnknownSyscall;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Exit,
            2 => Self::Print,
            3 => Self::ReadLine,
            4 => Self::Spawn,
            5 => Self::Wait,
            other => return Err(UnknownSyscall(other)),
        })
    }
}

impl From<Sysno> for u64 {
    fn from(value: Sysno) -> Self {
        value as Self
    }
}
