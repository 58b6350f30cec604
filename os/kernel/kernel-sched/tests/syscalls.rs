mod common;

use common::{CHILD_NAME, HELLO_TEXT, TERM, UNKNOWN_NAME, kernel, syscall, user_frame};
use kernel_info::memory::{USER_ENTRY, USER_WINDOW_END};
use kernel_info::segments::KERNEL_CS;
use kernel_sched::{BlockReason, ProcessId, ProcessState, TerminalId, TrapAction};
use kernel_sync::irq;
use kernel_syscall::{Color, SYSCALL_ERROR, Sysno};

#[test]
fn print_writes_to_the_process_terminal() {
    let mut k = kernel();
    k.spawn("hello", TERM).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    let action = syscall(
        &mut k,
        &mut frame,
        Sysno::Print.into(),
        USER_ENTRY + HELLO_TEXT,
        Color::Yellow as u64,
    );

    assert_eq!(action, TrapAction::Resume);
    assert_eq!(frame.gpr.rax, 12);
    assert_eq!(
        k.console().printed,
        vec![(TERM, b"hello, world".to_vec(), Color::Yellow)]
    );
    assert!(irq::are_enabled());
    assert_eq!(irq::depth(), 0);
}

#[test]
fn print_rejects_pointers_outside_the_window() {
    let mut k = kernel();
    k.spawn("hello", TERM).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    for bad in [0, USER_WINDOW_END, u64::MAX] {
        assert_eq!(
            syscall(&mut k, &mut frame, Sysno::Print.into(), bad, 0),
            TrapAction::Resume
        );
        assert_eq!(frame.gpr.rax, SYSCALL_ERROR);
    }
    assert!(k.console().printed.is_empty());
}

#[test]
fn unknown_selector_resumes_with_error() {
    let mut k = kernel();
    let pid = k.spawn("spin", TERM).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    frame.gpr.rbx = 99;
    for selector in [1, 6, 0x1234] {
        assert_eq!(
            syscall(&mut k, &mut frame, selector, 0, 0),
            TrapAction::Resume
        );
        assert_eq!(frame.gpr.rax, SYSCALL_ERROR);
    }
    assert_eq!(frame.gpr.rbx, 99);
    assert_eq!(k.running(), Some(pid));
}

#[test]
fn syscalls_from_kernel_mode_are_ignored() {
    let mut k = kernel();
    let pid = k.spawn("spin", TERM).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    frame.cs = u64::from(KERNEL_CS);
    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::Exit.into(), 0, 0),
        TrapAction::Resume
    );
    assert_eq!(frame.gpr.rax, u64::from(Sysno::Exit));
    assert!(k.process(pid).is_some());
}

#[test]
fn syscalls_from_outside_the_window_are_ignored() {
    let mut k = kernel();
    let pid = k.spawn("spin", TERM).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    frame.rip = 0x1000;
    frame.vector = 0x80;
    let before = {
        let mut f = frame;
        f.gpr.rax = Sysno::Exit.into();
        f
    };
    syscall(&mut k, &mut frame, Sysno::Exit.into(), 0, 0);
    assert_eq!(frame, before);
    assert!(k.process(pid).is_some());
}

#[test]
fn read_line_blocks_until_a_line_arrives() {
    let mut k = kernel();
    let pid = k.spawn("spin", TERM).unwrap();
    let current = k.select_next().unwrap();

    let buffer = USER_ENTRY + 0x1000;
    let mut frame = user_frame(&current.regs);
    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::ReadLine.into(), buffer, 4),
        TrapAction::EnterIdle
    );
    assert_eq!(k.reader_of(TERM), Some(pid));
    assert_eq!(k.process(pid).unwrap().state(), ProcessState::Blocked(BlockReason::ReadLine));
    assert!(k.select_next().is_none());

    assert!(!k.deliver_line(TerminalId(9), b"elsewhere"));
    assert!(k.deliver_line(TERM, b"hello"));
    assert_eq!(k.reader_of(TERM), None);

    let resumed = k.select_next().unwrap();
    assert_eq!(resumed.pid, pid);
    assert_eq!(resumed.regs.gpr.rax, 4);
    let process = k.process(pid).unwrap();
    assert_eq!(process.user_bytes(buffer, 5).unwrap(), b"hell\0");
}

#[test]
fn one_blocked_reader_per_terminal() {
    let mut k = kernel();
    let a = k.spawn("spin", TERM).unwrap();
    let b = k.spawn("spin", TERM).unwrap();

    let first = k.select_next().unwrap();
    let mut frame = user_frame(&first.regs);
    syscall(&mut k, &mut frame, Sysno::ReadLine.into(), USER_ENTRY + 0x100, 16);

    let second = k.select_next().unwrap();
    assert_eq!(second.pid, b);
    let mut frame = user_frame(&second.regs);
    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::ReadLine.into(), USER_ENTRY + 0x100, 16),
        TrapAction::Resume
    );
    assert_eq!(frame.gpr.rax, SYSCALL_ERROR);
    assert_eq!(k.reader_of(TERM), Some(a));
}

#[test]
fn read_line_rejects_buffers_leaving_the_window() {
    let mut k = kernel();
    k.spawn("spin", TERM).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::ReadLine.into(), USER_WINDOW_END - 8, 16),
        TrapAction::Resume
    );
    assert_eq!(frame.gpr.rax, SYSCALL_ERROR);
    assert_eq!(k.reader_of(TERM), None);
}

#[test]
fn spawn_returns_the_child_handle() {
    let mut k = kernel();
    let parent_terminal = TerminalId(3);
    k.spawn("hello", parent_terminal).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::Spawn.into(), USER_ENTRY + CHILD_NAME, 0),
        TrapAction::Resume
    );
    let child = ProcessId::from_raw(frame.gpr.rax).unwrap();
    let record = k.process(child).unwrap();
    assert_eq!(record.name(), "child");
    assert_eq!(record.terminal(), parent_terminal);
    assert!(k.is_runnable(child));

    syscall(&mut k, &mut frame, Sysno::Spawn.into(), USER_ENTRY + UNKNOWN_NAME, 0);
    assert_eq!(frame.gpr.rax, 0);
    assert_eq!(k.process_count(), 2);
}

#[test]
fn wait_argument_errors() {
    let mut k = kernel();
    let a = k.spawn("spin", TERM).unwrap();
    let b = k.spawn("spin", TERM).unwrap();
    let c = k.spawn("spin", TERM).unwrap();

    let first = k.select_next().unwrap();
    assert_eq!(first.pid, a);
    let mut frame = user_frame(&first.regs);
    for target in [0, 7, a.to_raw()] {
        assert_eq!(
            syscall(&mut k, &mut frame, Sysno::Wait.into(), target, 0),
            TrapAction::Resume
        );
        assert_eq!(frame.gpr.rax, SYSCALL_ERROR, "target {target:#x}");
    }

    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::Wait.into(), c.to_raw(), 0),
        TrapAction::EnterIdle
    );

    let second = k.select_next().unwrap();
    assert_eq!(second.pid, b);
    let mut frame = user_frame(&second.regs);
    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::Wait.into(), c.to_raw(), 0),
        TrapAction::Resume
    );
    assert_eq!(frame.gpr.rax, SYSCALL_ERROR);
    assert_eq!(k.process(c).unwrap().waiter(), Some(a));
}

#[test]
fn wait_on_a_terminated_process_fails() {
    let mut k = kernel();
    k.spawn("spin", TERM).unwrap();
    let gone = k.spawn("spin", TERM).unwrap();
    k.terminate(gone);

    let current = k.select_next().unwrap();
    let mut frame = user_frame(&current.regs);
    syscall(&mut k, &mut frame, Sysno::Wait.into(), gone.to_raw(), 0);
    assert_eq!(frame.gpr.rax, SYSCALL_ERROR);
}

#[test]
fn exit_notifies_the_console() {
    let mut k = kernel();
    let pid = k.spawn("spin", TerminalId(2)).unwrap();
    let current = k.select_next().unwrap();

    let mut frame = user_frame(&current.regs);
    assert_eq!(
        syscall(&mut k, &mut frame, Sysno::Exit.into(), 0, 0),
        TrapAction::EnterIdle
    );
    assert_eq!(k.console().done, vec![(TerminalId(2), pid)]);
    assert_eq!(k.running(), None);
}
