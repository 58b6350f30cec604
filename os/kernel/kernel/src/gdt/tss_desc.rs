use bitfield_struct::bitfield;

#[bitfield(u64)]
pub struct TssDescLow {
    pub limit_lo: u16,
    pub base_lo: u16,
    pub base_mid: u8,
    /// 0x9: available 64-bit TSS.
    #[bits(4)]
    pub typ: u8,
    pub s: bool,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
    #[bits(4)]
    pub limit_hi: u8,
    pub avl: bool,
    #[bits(2)]
    __zero: u8,
    pub g: bool,
    pub base_hi: u8,
}

#[bitfield(u64)]
pub struct TssDescHigh {
    pub base_upper: u32,
    __reserved: u32,
}

/// 16-byte system descriptor pointing at a [`Tss64`](crate::tss::Tss64).
#[repr(C)]
#[derive(Copy, Clone)]
pub struct TssDesc64 {
    pub low: TssDescLow,
    pub high: TssDescHigh,
}

impl TssDesc64 {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(base: u64, limit: u32) -> Self {
        let low = TssDescLow::new()
            .with_limit_lo(limit as u16)
            .with_limit_hi(((limit >> 16) & 0xF) as u8)
            .with_base_lo(base as u16)
            .with_base_mid((base >> 16) as u8)
            .with_base_hi((base >> 24) as u8)
            .with_typ(0x9)
            .with_present(true);
        let high = TssDescHigh::new().with_base_upper((base >> 32) as u32);
        Self { low, high }
    }
}

const _: () = assert!(size_of::<TssDesc64>() == 16);
