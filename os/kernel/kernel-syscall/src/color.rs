/// Text colors understood by the console, in VGA palette order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    #[default]
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

impl Color {
    const ALL: [Self; 16] = [
        Self::Black,
        Self::Blue,
        Self::Green,
        Self::Cyan,
        Self::Red,
        Self::Magenta,
        Self::Brown,
        Self::LightGray,
        Self::DarkGray,
        Self::LightBlue,
        Self::LightGreen,
        Self::LightCyan,
        Self::LightRed,
        Self::Pink,
        Self::Yellow,
        Self::White,
    ];

    /// Decodes a syscall argument; only the low nibble is significant.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_register(value: u64) -> Self {
        Self::ALL[(value & 0xf) as usize]
    }

    /// ANSI SGR foreground code for this color.
    #[must_use]
    pub const fn ansi_code(self) -> u8 {
        const ANSI: [u8; 8] = [30, 34, 32, 36, 31, 35, 33, 37];
        let index = self as usize;
        if index < 8 { ANSI[index] } else { ANSI[index - 8] + 60 }
    }
}
