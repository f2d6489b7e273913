//! Hardware-interrupt dispatch
//!
//! Every IRQ line funnels through one assembly wrapper whose contract is
//! fixed: save the general-purpose registers and the data segments, load the
//! kernel data segment, then hand the line number to [`irq_dispatch`], which
//! acknowledges the PIC, masks the line, runs the registered handler with
//! interrupts enabled (so a handler can be preempted by a *different* line
//! but never by itself), unmasks, and returns through `iretd`.
//!
//! The same wrapper discipline hosts the system-call gate: `int 0x80` with
//! the call number in `eax` and arguments in `ebx`/`ecx`/`edx`; whatever
//! `syscall_dispatch` returns is patched into the saved `eax` slot and so
//! becomes the user-visible return value.

use core::arch::global_asm;

use super::pic;
use crate::sync::InterruptCell;

/// A per-line handler. Runs with its own line masked and interrupts enabled.
pub type IrqHandler = fn();

/// Handlers indexed by IRQ line.
static HANDLERS: InterruptCell<[Option<IrqHandler>; pic::NUM_LINES as usize]> =
    InterruptCell::new([None; pic::NUM_LINES as usize]);

/// Register `handler` for `line`. Call during boot, before the line is
/// unmasked.
pub fn set_handler(line: u8, handler: IrqHandler) {
    super::interrupts::without_interrupts(|| {
        // SAFETY: interrupts disabled for the table write.
        unsafe { HANDLERS.get_mut()[line as usize] = Some(handler) };
    })
}

/// Common IRQ body, called from the assembly wrapper with registers already
/// saved and the kernel data segment loaded. Infallible by construction: no
/// allocation, only the preallocated handler table.
#[no_mangle]
extern "C" fn irq_dispatch(line: u32) {
    let line = line as u8;
    pic::end_of_interrupt(line);
    pic::mask(line);

    // Read the entry before opening the interrupt window.
    // SAFETY: interrupts are still disabled here (interrupt gate).
    let handler = unsafe { HANDLERS.get_mut()[line as usize] };

    super::interrupts::enable();
    match handler {
        Some(handler) => handler(),
        None => log::warn!("unexpected interrupt on line {line}"),
    }
    super::interrupts::disable();

    pic::unmask(line);
}

// One stub per line pushes its number and joins the common wrapper. The
// wrapper saves eax..edi plus ds/es, loads the kernel data segment (0x10),
// and passes the line number (at esp+40: 8 GPRs + 2 segment slots) to
// irq_dispatch.
global_asm!(
    r#"
.global irq_stub_0
irq_stub_0:
    push 0
    jmp irq_common
.global irq_stub_1
irq_stub_1:
    push 1
    jmp irq_common
.global irq_stub_2
irq_stub_2:
    push 2
    jmp irq_common
.global irq_stub_3
irq_stub_3:
    push 3
    jmp irq_common
.global irq_stub_4
irq_stub_4:
    push 4
    jmp irq_common
.global irq_stub_5
irq_stub_5:
    push 5
    jmp irq_common
.global irq_stub_6
irq_stub_6:
    push 6
    jmp irq_common
.global irq_stub_7
irq_stub_7:
    push 7
    jmp irq_common
.global irq_stub_8
irq_stub_8:
    push 8
    jmp irq_common
.global irq_stub_9
irq_stub_9:
    push 9
    jmp irq_common
.global irq_stub_10
irq_stub_10:
    push 10
    jmp irq_common
.global irq_stub_11
irq_stub_11:
    push 11
    jmp irq_common
.global irq_stub_12
irq_stub_12:
    push 12
    jmp irq_common
.global irq_stub_13
irq_stub_13:
    push 13
    jmp irq_common
.global irq_stub_14
irq_stub_14:
    push 14
    jmp irq_common
.global irq_stub_15
irq_stub_15:
    push 15
    jmp irq_common

irq_common:
    pushad
    push ds
    push es
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov eax, [esp + 40]
    push eax
    call irq_dispatch
    add esp, 4
    pop es
    pop ds
    popad
    add esp, 4
    iretd

.global syscall_entry
syscall_entry:
    push ds
    push es
    pushad
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    push edx
    push ecx
    push ebx
    push dword ptr [esp + 40]
    call syscall_dispatch
    add esp, 16
    mov [esp + 28], eax
    popad
    pop es
    pop ds
    iretd
"#
);

extern "C" {
    pub fn irq_stub_0();
    pub fn irq_stub_1();
    pub fn irq_stub_2();
    pub fn irq_stub_3();
    pub fn irq_stub_4();
    pub fn irq_stub_5();
    pub fn irq_stub_6();
    pub fn irq_stub_7();
    pub fn irq_stub_8();
    pub fn irq_stub_9();
    pub fn irq_stub_10();
    pub fn irq_stub_11();
    pub fn irq_stub_12();
    pub fn irq_stub_13();
    pub fn irq_stub_14();
    pub fn irq_stub_15();
    pub fn syscall_entry();
}

/// Stub entry points in line order, for IDT installation.
pub static IRQ_STUBS: [unsafe extern "C" fn(); pic::NUM_LINES as usize] = [
    irq_stub_0,
    irq_stub_1,
    irq_stub_2,
    irq_stub_3,
    irq_stub_4,
    irq_stub_5,
    irq_stub_6,
    irq_stub_7,
    irq_stub_8,
    irq_stub_9,
    irq_stub_10,
    irq_stub_11,
    irq_stub_12,
    irq_stub_13,
    irq_stub_14,
    irq_stub_15,
];
