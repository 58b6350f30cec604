#![allow(dead_code)]

use kernel_alloc::KernelHeap;
use kernel_info::segments::{USER_CS, USER_DS};
use kernel_sched::{Console, Kernel, ProcessId, Program, Registers, TerminalId, TrapAction, TrapFrame, TrapKind};
use kernel_syscall::Color;
use std::ptr::NonNull;

/// Room for the block map, alignment padding and at least six process pages.
pub const REGION_SIZE: usize = 16 * 1024 * 1024;

pub const TERM: TerminalId = TerminalId(1);

/// `jmp $`
const SPIN: &[u8] = &[0xEB, 0xFE];

pub static PROGRAMS: [Program; 3] = [
    Program::new("spin", SPIN),
    Program::new("hello", b"\xEB\xFEhello, world\0child\0nope\0"),
    Program::new("child", SPIN),
];

/// Offsets of the strings inside the `hello` image.
pub const HELLO_TEXT: u64 = 2;
pub const CHILD_NAME: u64 = 15;
pub const UNKNOWN_NAME: u64 = 21;

#[derive(Default)]
pub struct Recorder {
    pub printed: Vec<(TerminalId, Vec<u8>, Color)>,
    pub done: Vec<(TerminalId, ProcessId)>,
}

impl Console for Recorder {
    fn print_color_to(&mut self, terminal: TerminalId, text: &[u8], color: Color) {
        self.printed.push((terminal, text.to_vec(), color));
    }

    fn process_done(&mut self, terminal: TerminalId, pid: ProcessId) {
        self.done.push((terminal, pid));
    }
}

pub fn heap() -> &'static KernelHeap {
    let region: &'static mut [u8] = Box::leak(vec![0u8; REGION_SIZE].into_boxed_slice());
    let heap: &'static KernelHeap = Box::leak(Box::new(KernelHeap::new()));
    unsafe {
        heap.init(NonNull::new(region.as_mut_ptr()).unwrap(), REGION_SIZE)
            .unwrap();
    }
    heap
}

pub fn kernel() -> Kernel<Recorder> {
    Kernel::new(heap(), Recorder::default(), &PROGRAMS)
}

/// The frame a trap out of a process with `regs` would build.
pub fn user_frame(regs: &Registers) -> TrapFrame {
    TrapFrame {
        gpr: regs.gpr,
        vector: 0,
        error_code: 0,
        rip: regs.rip,
        cs: u64::from(USER_CS),
        rflags: regs.rflags,
        rsp: regs.rsp,
        ss: u64::from(USER_DS),
    }
}

/// Issues `int 0x80` from `frame` with the given selector and arguments.
pub fn syscall(kernel: &mut Kernel<Recorder>, frame: &mut TrapFrame, rax: u64, rdi: u64, rsi: u64) -> TrapAction {
    frame.vector = 0x80;
    frame.gpr.rax = rax;
    frame.gpr.rdi = rdi;
    frame.gpr.rsi = rsi;
    kernel.handle_trap(TrapKind::Syscall, frame, 0)
}

/// Delivers one timer tick to whatever `frame` interrupted.
pub fn tick(kernel: &mut Kernel<Recorder>, frame: &mut TrapFrame) -> TrapAction {
    frame.vector = 0x20;
    kernel.handle_trap(TrapKind::Timer, frame, 0)
}
