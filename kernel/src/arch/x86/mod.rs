//! 32-bit protected-mode x86 support

pub mod context;
pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod irq;
pub mod multiboot;
pub mod pic;
pub mod port;
pub mod usermode;

/// Stop the machine: interrupts off, halt in a loop.
///
/// `hlt` with interrupts disabled never wakes up; the loop guards against
/// NMIs falling through.
pub fn halt_forever() -> ! {
    interrupts::disable();
    loop {
        // SAFETY: hlt has no memory effects.
        unsafe { core::arch::asm!("hlt", options(nomem, nostack, preserves_flags)) };
    }
}
