//! Interrupt descriptor table
//!
//! All 256 vectors are gate descriptors in a static table: processor
//! exceptions (interrupt gates, DPL 0), the 16 remapped hardware lines
//! (interrupt gates into the generic wrapper), and the system-call vector
//! 0x80 (interrupt gate, DPL 3 so ring 3 may raise it).
//!
//! Exceptions do not recover: each handler paints a diagnostic screen and
//! stops the machine.

use core::arch::asm;
use core::mem::size_of;

use super::{gdt, irq, pic};
use crate::sync::InterruptCell;

/// Vector for `int 0x80` system calls.
pub const SYSCALL_VECTOR: usize = 0x80;

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl GateDescriptor {
    const MISSING: GateDescriptor = GateDescriptor {
        offset_low: 0,
        selector: 0,
        zero: 0,
        type_attr: 0,
        offset_high: 0,
    };

    /// 32-bit interrupt gate. `dpl` 3 makes the vector reachable from ring 3.
    fn interrupt_gate(handler: u32, dpl: u8) -> Self {
        Self {
            offset_low: handler as u16,
            selector: gdt::KERNEL_CS,
            zero: 0,
            type_attr: 0x8E | (dpl << 5),
            offset_high: (handler >> 16) as u16,
        }
    }
}

static IDT: InterruptCell<[GateDescriptor; 256]> =
    InterruptCell::new([GateDescriptor::MISSING; 256]);

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

/// Hardware stack frame pushed by the CPU for an interrupt from ring 0.
#[repr(C)]
pub struct ExceptionFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

/// Install all gates and load the IDT register. Boot path, interrupts off.
pub fn init() {
    // SAFETY: boot path, single thread, interrupts disabled; the table is
    // static so the loaded pointer stays valid.
    unsafe {
        let idt = IDT.get_mut();

        set_exception_gates(idt);

        for (line, stub) in irq::IRQ_STUBS.iter().enumerate() {
            idt[pic::MASTER_VECTOR_BASE as usize + line] =
                GateDescriptor::interrupt_gate(*stub as usize as u32, 0);
        }

        let syscall_gate: unsafe extern "C" fn() = irq::syscall_entry;
        idt[SYSCALL_VECTOR] = GateDescriptor::interrupt_gate(syscall_gate as usize as u32, 3);

        let pointer = DescriptorTablePointer {
            limit: (size_of::<[GateDescriptor; 256]>() - 1) as u16,
            base: IDT.as_ptr() as u32,
        };
        asm!(
            "lidt [{}]",
            in(reg) &pointer as *const DescriptorTablePointer,
            options(nostack)
        );
    }
}

type Handler = extern "x86-interrupt" fn(ExceptionFrame);
type HandlerWithCode = extern "x86-interrupt" fn(ExceptionFrame, u32);

fn set_exception_gates(idt: &mut [GateDescriptor; 256]) {
    let set = |idt: &mut [GateDescriptor; 256], vector: usize, handler: Handler| {
        idt[vector] = GateDescriptor::interrupt_gate(handler as usize as u32, 0);
    };
    let set_with_code =
        |idt: &mut [GateDescriptor; 256], vector: usize, handler: HandlerWithCode| {
            idt[vector] = GateDescriptor::interrupt_gate(handler as usize as u32, 0);
        };

    set(idt, 0, divide_error);
    set(idt, 1, debug_exception);
    set(idt, 2, non_maskable_interrupt);
    set(idt, 3, breakpoint);
    set(idt, 4, overflow);
    set(idt, 5, bound_range);
    set(idt, 6, invalid_opcode);
    set(idt, 7, fpu_not_available);
    set_with_code(idt, 8, double_fault);
    set(idt, 9, coprocessor_overrun);
    set_with_code(idt, 10, invalid_tss);
    set_with_code(idt, 11, segment_not_present);
    set_with_code(idt, 12, stack_fault);
    set_with_code(idt, 13, general_protection);
    set_with_code(idt, 14, page_fault);
    // 15 is reserved by Intel.
    set(idt, 16, floating_point_error);
    set_with_code(idt, 17, alignment_check);
    set(idt, 18, machine_check);
    set(idt, 19, simd_error);
}

extern "x86-interrupt" fn divide_error(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Divide-By-Zero Error ");
}

extern "x86-interrupt" fn debug_exception(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Debug Exception ");
}

extern "x86-interrupt" fn non_maskable_interrupt(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Non-Maskable Interrupt ");
}

extern "x86-interrupt" fn breakpoint(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Breakpoint ");
}

extern "x86-interrupt" fn overflow(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Overflow ");
}

extern "x86-interrupt" fn bound_range(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Bound Range Exceeded ");
}

extern "x86-interrupt" fn invalid_opcode(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Invalid Opcode ");
}

extern "x86-interrupt" fn fpu_not_available(_frame: ExceptionFrame) {
    crate::terminal::fatal(" FPU Not Available ");
}

extern "x86-interrupt" fn double_fault(_frame: ExceptionFrame, _error_code: u32) {
    crate::terminal::fatal(" Double Fault ");
}

extern "x86-interrupt" fn coprocessor_overrun(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Coprocessor Segment Overrun ");
}

extern "x86-interrupt" fn invalid_tss(_frame: ExceptionFrame, _error_code: u32) {
    crate::terminal::fatal(" Invalid TSS ");
}

extern "x86-interrupt" fn segment_not_present(_frame: ExceptionFrame, _error_code: u32) {
    crate::terminal::fatal(" Segment Not Present ");
}

extern "x86-interrupt" fn stack_fault(_frame: ExceptionFrame, _error_code: u32) {
    crate::terminal::fatal(" Stack Fault ");
}

extern "x86-interrupt" fn general_protection(_frame: ExceptionFrame, _error_code: u32) {
    crate::terminal::fatal(" General Protection Fault ");
}

extern "x86-interrupt" fn page_fault(_frame: ExceptionFrame, _error_code: u32) {
    let cr2: u32;
    // SAFETY: reading CR2 has no side effects.
    unsafe { asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags)) };
    log::error!("page fault at {cr2:#010x}");
    crate::terminal::fatal(" Page Fault ");
}

extern "x86-interrupt" fn floating_point_error(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Floating-Point Error ");
}

extern "x86-interrupt" fn alignment_check(_frame: ExceptionFrame, _error_code: u32) {
    crate::terminal::fatal(" Alignment Check ");
}

extern "x86-interrupt" fn machine_check(_frame: ExceptionFrame) {
    crate::terminal::fatal(" Machine Check ");
}

extern "x86-interrupt" fn simd_error(_frame: ExceptionFrame) {
    crate::terminal::fatal(" SIMD Floating-Point Error ");
}
