/// A program that can be spawned by name.
#[derive(Debug, Copy, Clone)]
pub struct Program {
    pub name: &'static str,
    /// Flat machine code, loaded at the user entry address.
    pub image: &'static [u8],
}

impl Program {
    #[must_use]
    pub const fn new(name: &'static str, image: &'static [u8]) -> Self {
        Self { name, image }
    }
}

/// Looks up a program by its name bytes.
#[must_use]
pub fn find<'a>(programs: &'a [Program], name: &[u8]) -> Option<&'a Program> {
    programs.iter().find(|p| p.name.as_bytes() == name)
}
