//! # Debug-Port Console
//!
//! The one terminal of this kernel is QEMU's debug console. Process output
//! is colored with ANSI escapes; keyboard input is echoed and assembled into
//! lines here before the scheduler hands them to a blocked reader.

use alloc::vec::Vec;
use kernel_qemu::{qemu_trace, qemu_write_bytes};
use kernel_sched::{Console, LineEditor, ProcessId, TerminalId};
use kernel_syscall::Color;

/// The terminal keyboard input belongs to.
pub const CONSOLE_TERMINAL: TerminalId = TerminalId(0);

#[derive(Default)]
pub struct DebugConsole {
    editor: LineEditor,
}

impl DebugConsole {
    pub const fn new() -> Self {
        Self {
            editor: LineEditor::new(),
        }
    }

    /// Echoes one typed character and returns the finished line on enter.
    pub fn push_key(&mut self, key: char) -> Option<Vec<u8>> {
        self.editor.push_key(key, qemu_write_bytes)
    }
}

impl Console for DebugConsole {
    fn print_color_to(&mut self, terminal: TerminalId, text: &[u8], color: Color) {
        if terminal != CONSOLE_TERMINAL {
            qemu_trace!("[tty{}] ", terminal.0);
        }
        qemu_trace!("\x1b[{}m", color.ansi_code());
        qemu_write_bytes(text);
        qemu_write_bytes(b"\x1b[0m");
    }

    fn process_done(&mut self, terminal: TerminalId, pid: ProcessId) {
        log::debug!("{pid} on tty{} done", terminal.0);
    }
}
