//! # Global Descriptor Table
//!
//! Long mode ignores segment bases and limits, but `iretq` into ring 3 still
//! needs user code and data descriptors, and traps out of ring 3 need a
//! loaded TSS to find `rsp0`.
//!
//! The layout matches the selectors in [`kernel_info::segments`].

pub mod descriptors;
pub mod tss_desc;

use crate::gdt::descriptors::SegmentDesc;
use crate::gdt::tss_desc::TssDesc64;
use crate::tss::Tss64;
use core::cell::UnsafeCell;
use kernel_info::segments::{KERNEL_CS, KERNEL_DS, TSS_SEL};

/// Pointer format required by `lgdt` and `lidt`.
#[repr(C, packed)]
pub struct DescTablePtr {
    /// Size of the table minus one.
    pub limit: u16,
    pub base: u64,
}

#[repr(C, align(16))]
pub struct Gdt {
    null: SegmentDesc,
    kcode: SegmentDesc,
    kdata: SegmentDesc,
    udata: SegmentDesc,
    ucode: SegmentDesc,
    tss: TssDesc64,
}

impl Gdt {
    pub const fn new(tss: TssDesc64) -> Self {
        Self {
            null: SegmentDesc::NULL,
            kcode: SegmentDesc::code(0),
            kdata: SegmentDesc::data(0),
            udata: SegmentDesc::data(3),
            ucode: SegmentDesc::code(3),
            tss,
        }
    }
}

const _: () = {
    assert!(core::mem::offset_of!(Gdt, kcode) == KERNEL_CS as usize);
    assert!(core::mem::offset_of!(Gdt, kdata) == KERNEL_DS as usize);
    assert!(core::mem::offset_of!(Gdt, udata) == (kernel_info::segments::USER_DS & !3) as usize);
    assert!(core::mem::offset_of!(Gdt, ucode) == (kernel_info::segments::USER_CS & !3) as usize);
    assert!(core::mem::offset_of!(Gdt, tss) == TSS_SEL as usize);
};

struct GdtCell(UnsafeCell<Gdt>);

// SAFETY: written once during single-threaded bring-up.
unsafe impl Sync for GdtCell {}

static GDT: GdtCell = GdtCell(UnsafeCell::new(Gdt::new(TssDesc64::new(0, 0))));

/// Builds the GDT around `tss`, loads it, reloads the segment registers and
/// loads the task register.
///
/// # Safety
/// Call once during bring-up with interrupts masked.
#[allow(clippy::cast_possible_truncation)]
pub unsafe fn init(tss: &'static Tss64) {
    let gdt = unsafe { &mut *GDT.0.get() };
    *gdt = Gdt::new(TssDesc64::new(
        core::ptr::from_ref(tss) as u64,
        (size_of::<Tss64>() - 1) as u32,
    ));

    let ptr = DescTablePtr {
        limit: (size_of::<Gdt>() - 1) as u16,
        base: core::ptr::from_ref(gdt) as u64,
    };

    unsafe {
        core::arch::asm!(
            "lgdt [{}]",
            in(reg) &raw const ptr,
            options(readonly, nostack, preserves_flags)
        );

        core::arch::asm!(
            "mov ds, {0:x}",
            "mov es, {0:x}",
            "mov ss, {0:x}",
            in(reg) KERNEL_DS,
            options(nostack, preserves_flags)
        );

        // Far return to reload CS.
        core::arch::asm!(
            "push {cs}",
            "lea rax, [rip + 2f]",
            "push rax",
            "retfq",
            "2:",
            cs = in(reg) u64::from(KERNEL_CS),
            out("rax") _,
            options(preserves_flags)
        );

        core::arch::asm!(
            "ltr {0:x}",
            in(reg) TSS_SEL,
            options(nostack, preserves_flags)
        );
    }
}
