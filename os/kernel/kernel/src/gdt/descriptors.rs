//! 64-bit code and data segment descriptors.
//!
//! In long mode base and limit are ignored; only type, DPL, present and the
//! `L` bit of code segments matter.

use bitfield_struct::bitfield;

/// Code or data segment descriptor.
#[bitfield(u64)]
pub struct SegmentDesc {
    pub limit_lo: u16,
    pub base_lo: u16,
    pub base_mid: u8,
    /// `0b1010` execute/read code, `0b0010` read/write data.
    #[bits(4)]
    pub typ: u8,
    /// 1 for code/data, 0 for system descriptors.
    pub s: bool,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
    #[bits(4)]
    pub limit_hi: u8,
    pub avl: bool,
    /// 64-bit code segment.
    pub l: bool,
    /// Must be 0 when `l` is set.
    pub db: bool,
    pub g: bool,
    pub base_hi: u8,
}

impl SegmentDesc {
    pub const NULL: Self = Self::new();

    #[must_use]
    pub const fn code(dpl: u8) -> Self {
        Self::new()
            .with_typ(0b1010)
            .with_s(true)
            .with_dpl(dpl & 0b11)
            .with_present(true)
            .with_l(true)
    }

    #[must_use]
    pub const fn data(dpl: u8) -> Self {
        Self::new()
            .with_typ(0b0010)
            .with_s(true)
            .with_dpl(dpl & 0b11)
            .with_present(true)
    }
}

const _: () = {
    assert!(size_of::<SegmentDesc>() == 8);
    assert!(SegmentDesc::code(0).into_bits() == 0x0020_9a00_0000_0000);
    assert!(SegmentDesc::data(0).into_bits() == 0x0000_9200_0000_0000);
    assert!(SegmentDesc::code(3).into_bits() == 0x0020_fa00_0000_0000);
    assert!(SegmentDesc::data(3).into_bits() == 0x0000_f200_0000_0000);
};
