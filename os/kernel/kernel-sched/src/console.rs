//! The narrow interface to the terminal multiplexer.

use crate::process::ProcessId;
use alloc::vec::Vec;
use kernel_info::config::MAX_LINE_LEN;
use kernel_syscall::Color;

/// Identifies one virtual terminal.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TerminalId(pub u8);

/// Output sink and lifecycle observer for processes.
///
/// Line input flows the other way, through
/// [`Kernel::deliver_line`](crate::Kernel::deliver_line).
pub trait Console {
    /// Writes `text` to `terminal` in `color`.
    fn print_color_to(&mut self, terminal: TerminalId, text: &[u8], color: Color);

    /// Called once after `pid` has terminated.
    fn process_done(&mut self, terminal: TerminalId, pid: ProcessId);
}

const BACKSPACE: char = '\u{8}';
const DELETE: char = '\u{7f}';

/// Assembles typed characters into lines of at most [`MAX_LINE_LEN`] bytes.
#[derive(Debug, Default)]
pub struct LineEditor {
    line: Vec<u8>,
}

impl LineEditor {
    #[must_use]
    pub const fn new() -> Self {
        Self { line: Vec::new() }
    }

    /// Bytes typed since the last finished line.
    pub fn pending(&self) -> &[u8] {
        &self.line
    }

    /// Applies one key, writing whatever the terminal should show to `echo`.
    ///
    /// Returns the finished line on enter. Keys that are neither printable
    /// ASCII nor editing keys are ignored.
    pub fn push_key(&mut self, key: char, mut echo: impl FnMut(&[u8])) -> Option<Vec<u8>> {
        match key {
            '\n' | '\r' => {
                echo(b"\n");
                Some(core::mem::take(&mut self.line))
            }
            BACKSPACE | DELETE => {
                if self.line.pop().is_some() {
                    echo(b"\x08 \x08");
                }
                None
            }
            c if c.is_ascii() && !c.is_ascii_control() => {
                if let Ok(byte) = u8::try_from(c)
                    && self.line.len() < MAX_LINE_LEN
                {
                    self.line.push(byte);
                    echo(&[byte]);
                }
                None
            }
            _ => None,
        }
    }
}
