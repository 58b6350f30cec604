//! # Built-in User Programs
//!
//! Flat, position-independent ring-3 images assembled into `.user.text`.
//! Each is copied to the base of a fresh process page and entered at its
//! first byte with the stack near the top of the window. They talk to the
//! kernel only through `int 0x80`; every register but `rax` survives a call.
//!
//! * `shell` prompts, reads a line and spawns the program of that name,
//!   waiting for it to finish.
//! * `hello` prints a greeting and exits.
//! * `count` prints five ticks with busy waiting in between, then exits.
//! * `spin` never yields; only preemption gets the CPU back.

use kernel_sched::Program;
use kernel_sync::SyncOnceCell;

// Selectors: exit 0, print 2, read_line 3, spawn 4, wait 5.
// Colors: 10 light green, 12 light red, 14 yellow.
core::arch::global_asm!(
    r#"
    .pushsection .user.text,"ax",@progbits

    .balign 16
    .globl shell_start
shell_start:
    sub rsp, 256
.Lshell_prompt:
    lea rdi, [rip + .Lshell_prompt_text]
    mov esi, 10
    mov eax, 2
    int 0x80
    mov rdi, rsp
    mov esi, 255
    mov eax, 3
    int 0x80
    cmp rax, -1
    je .Lshell_prompt
    test rax, rax
    je .Lshell_prompt
    mov byte ptr [rsp + rax], 0
    mov rdi, rsp
    mov eax, 4
    int 0x80
    test rax, rax
    je .Lshell_unknown
    mov rdi, rax
    mov eax, 5
    int 0x80
    jmp .Lshell_prompt
.Lshell_unknown:
    lea rdi, [rip + .Lshell_unknown_text]
    mov esi, 12
    mov eax, 2
    int 0x80
    jmp .Lshell_prompt
.Lshell_prompt_text:
    .asciz "> "
.Lshell_unknown_text:
    .asciz "unknown program\n"
    .globl shell_end
shell_end:

    .balign 16
    .globl hello_start
hello_start:
    lea rdi, [rip + .Lhello_text]
    mov esi, 14
    mov eax, 2
    int 0x80
    xor eax, eax
    int 0x80
.Lhello_text:
    .asciz "hello, world\n"
    .globl hello_end
hello_end:

    .balign 16
    .globl count_start
count_start:
    mov ebx, 5
.Lcount_tick:
    lea rdi, [rip + .Lcount_text]
    mov esi, 14
    mov eax, 2
    int 0x80
    mov ecx, 50000000
.Lcount_delay:
    pause
    dec ecx
    jnz .Lcount_delay
    dec ebx
    jnz .Lcount_tick
    xor eax, eax
    int 0x80
.Lcount_text:
    .asciz "tick\n"
    .globl count_end
count_end:

    .balign 16
    .globl spin_start
spin_start:
    pause
    jmp spin_start
    .globl spin_end
spin_end:

    .popsection
"#
);

unsafe extern "C" {
    static shell_start: u8;
    static shell_end: u8;
    static hello_start: u8;
    static hello_end: u8;
    static count_start: u8;
    static count_end: u8;
    static spin_start: u8;
    static spin_end: u8;
}

/// Name of the program started on the console at boot.
pub const INIT: &str = "shell";

/// The bytes between two symbols of `.user.text`.
fn image(start: *const u8, end: *const u8) -> &'static [u8] {
    let len = (end as usize).saturating_sub(start as usize);
    // SAFETY: both symbols delimit one assembled program inside the kernel image.
    unsafe { core::slice::from_raw_parts(start, len) }
}

static PROGRAMS: SyncOnceCell<[Program; 4]> = SyncOnceCell::new();

/// Every program that can be spawned by name.
pub fn all() -> &'static [Program] {
    PROGRAMS.get_or_init(|| {
        [
            Program::new("shell", image(&raw const shell_start, &raw const shell_end)),
            Program::new("hello", image(&raw const hello_start, &raw const hello_end)),
            Program::new("count", image(&raw const count_start, &raw const count_end)),
            Program::new("spin", image(&raw const spin_start, &raw const spin_end)),
        ]
    })
}
