//! Trap classification and the frame every trampoline builds.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_info::memory::is_user_address;
use kernel_info::segments::rpl;
use kernel_syscall::SYSCALL_VECTOR;

/// First vector of the remapped primary PIC.
pub const IRQ_BASE: u8 = 0x20;
pub const TIMER_VECTOR: u8 = IRQ_BASE;
pub const KEYBOARD_VECTOR: u8 = IRQ_BASE + 1;
/// One past the last PIC vector.
pub const IRQ_END: u8 = IRQ_BASE + 16;

/// Exceptions for which the CPU pushes an error code.
pub const VECTORS_WITH_ERROR_CODE: [u8; 10] = [8, 10, 11, 12, 13, 14, 17, 21, 29, 30];

/// General-purpose registers in the order the trampolines push them,
/// lowest address first.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct GeneralRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

/// Stack contents at the Rust entry of every trap.
///
/// For vectors without a hardware error code the trampoline pushes a zero,
/// so the layout is uniform.
#[repr(C)]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub gpr: GeneralRegisters,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

const _: () = assert!(size_of::<TrapFrame>() == 22 * 8);

impl TrapFrame {
    /// Whether the trap interrupted ring 3.
    #[inline]
    #[must_use]
    pub fn from_user_mode(&self) -> bool {
        rpl(self.cs) == 3
    }

    /// Whether the trap interrupted ring 3 code running inside the user window.
    #[inline]
    #[must_use]
    pub fn from_user_window(&self) -> bool {
        self.from_user_mode() && is_user_address(self.rip)
    }
}

impl fmt::Debug for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vector={:#04x} err={:#x} rip={:#018x} cs={:#x} rflags={:#x} rsp={:#018x} ss={:#x}",
            self.vector, self.error_code, self.rip, self.cs, self.rflags, self.rsp, self.ss
        )
    }
}

/// Handler class of an IDT slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrapKind {
    Fault,
    FaultWithCode,
    DivideByZero,
    DoubleFault,
    PageFault,
    Irq { line: u8 },
    Timer,
    Keyboard,
    Syscall,
}

/// x86 gate types used by the IDT.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GateKind {
    /// Leaves `IF` as it was.
    Trap,
    /// Clears `IF` on entry.
    Interrupt,
}

impl TrapKind {
    /// Handler class of `vector`.
    #[must_use]
    pub fn classify(vector: u8) -> Self {
        match vector {
            0 => Self::DivideByZero,
            8 => Self::DoubleFault,
            14 => Self::PageFault,
            v if v < IRQ_BASE && VECTORS_WITH_ERROR_CODE.contains(&v) => Self::FaultWithCode,
            v if v < IRQ_BASE => Self::Fault,
            TIMER_VECTOR => Self::Timer,
            KEYBOARD_VECTOR => Self::Keyboard,
            v if v < IRQ_END => Self::Irq { line: v - IRQ_BASE },
            SYSCALL_VECTOR => Self::Syscall,
            _ => Self::Fault,
        }
    }

    #[must_use]
    pub const fn gate(self) -> GateKind {
        match self {
            Self::Fault | Self::FaultWithCode | Self::DivideByZero => GateKind::Trap,
            _ => GateKind::Interrupt,
        }
    }

    /// Lowest privilege level allowed to raise the vector with `int n`.
    #[must_use]
    pub const fn dpl(self) -> u8 {
        match self {
            Self::Syscall => 3,
            _ => 0,
        }
    }

    /// Whether the class is a CPU exception.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        matches!(
            self,
            Self::Fault | Self::FaultWithCode | Self::DivideByZero | Self::DoubleFault | Self::PageFault
        )
    }
}

/// Where a trap handler continues.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrapAction {
    /// Return to the interrupted context through the (possibly edited) frame.
    Resume,
    /// Abandon the interrupted context and continue in the idle loop.
    EnterIdle,
}

/// Page-fault error code layout (x86-64).
///
/// Reference: Intel SDM Vol. 3A, §6.15.1 “Page-Fault Exception (#PF)”.
#[bitfield(u64)]
pub struct PageFaultError {
    /// 0 = non-present page, 1 = protection violation.
    pub present: bool,
    /// 1 = write access.
    pub write: bool,
    /// 1 = access from CPL 3.
    pub user: bool,
    /// 1 = reserved bit set in a paging structure.
    pub reserved_bit: bool,
    /// 1 = instruction fetch.
    pub instruction_fetch: bool,
    /// 1 = protection-key violation.
    pub protection_key: bool,
    /// 1 = shadow stack access.
    pub shadow_stack: bool,
    #[bits(57)]
    __: u64,
}

impl PageFaultError {
    #[must_use]
    pub fn explain(&self) -> &'static str {
        if !self.present() {
            "non-present page"
        } else if self.instruction_fetch() {
            if self.user() {
                "user-mode instruction fetch on protected page"
            } else {
                "kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "write access to protected page"
        } else {
            "read access to protected page"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::USER_WINDOW_BASE;
    use kernel_info::segments::{KERNEL_CS, USER_CS};

    #[test]
    fn classifies_every_vector() {
        assert_eq!(TrapKind::classify(0), TrapKind::DivideByZero);
        assert_eq!(TrapKind::classify(3), TrapKind::Fault);
        assert_eq!(TrapKind::classify(8), TrapKind::DoubleFault);
        assert_eq!(TrapKind::classify(13), TrapKind::FaultWithCode);
        assert_eq!(TrapKind::classify(14), TrapKind::PageFault);
        assert_eq!(TrapKind::classify(0x20), TrapKind::Timer);
        assert_eq!(TrapKind::classify(0x21), TrapKind::Keyboard);
        assert_eq!(TrapKind::classify(0x2C), TrapKind::Irq { line: 12 });
        assert_eq!(TrapKind::classify(0x80), TrapKind::Syscall);
        assert_eq!(TrapKind::classify(0xFF), TrapKind::Fault);
    }

    #[test]
    fn only_the_syscall_gate_is_user_callable() {
        for vector in 0..=u8::MAX {
            let kind = TrapKind::classify(vector);
            assert_eq!(kind.dpl() == 3, vector == SYSCALL_VECTOR, "vector {vector:#x}");
        }
    }

    #[test]
    fn gate_types_follow_the_class() {
        assert_eq!(TrapKind::classify(6).gate(), GateKind::Trap);
        assert_eq!(TrapKind::classify(13).gate(), GateKind::Trap);
        assert_eq!(TrapKind::DoubleFault.gate(), GateKind::Interrupt);
        assert_eq!(TrapKind::PageFault.gate(), GateKind::Interrupt);
        assert_eq!(TrapKind::Timer.gate(), GateKind::Interrupt);
        assert_eq!(TrapKind::Syscall.gate(), GateKind::Interrupt);
    }

    #[test]
    fn user_window_check_needs_ring_three_and_window_rip() {
        let mut frame = TrapFrame {
            cs: u64::from(USER_CS),
            rip: USER_WINDOW_BASE + 0x40,
            ..TrapFrame::default()
        };
        assert!(frame.from_user_window());

        frame.rip = 0x1000;
        assert!(frame.from_user_mode());
        assert!(!frame.from_user_window());

        frame.cs = u64::from(KERNEL_CS);
        frame.rip = USER_WINDOW_BASE;
        assert!(!frame.from_user_window());
    }

    #[test]
    fn page_fault_error_bits() {
        let err = PageFaultError::from_bits(0b110);
        assert!(err.write());
        assert!(err.user());
        assert_eq!(err.explain(), "non-present page");
        assert_eq!(PageFaultError::from_bits(0b10111).explain(), "user-mode instruction fetch on protected page");
    }
}
