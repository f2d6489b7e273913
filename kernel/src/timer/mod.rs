//! Programmable interval timer
//!
//! The 8253/8254 channel 0 drives preemption: every tick lands in the
//! scheduler. 100 Hz is plenty for three terminals of interactive work.

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod active {
    use crate::arch::x86::{interrupts, pic, port};
    use crate::sched;

    const CHANNEL0_PORT: u16 = 0x40;
    const COMMAND_PORT: u16 = 0x43;

    /// Channel 0, lobyte/hibyte access, square-wave mode.
    const COMMAND_SQUARE_WAVE: u8 = 0x36;

    /// The PIT's input clock.
    const PIT_HZ: u32 = 1_193_182;
    /// Scheduler tick rate.
    pub const TICK_HZ: u32 = 100;

    /// Program the tick rate and unmask the timer line.
    pub fn init() {
        let divisor = (PIT_HZ / TICK_HZ) as u16;
        interrupts::without_interrupts(|| {
            // SAFETY: standard PIT programming sequence, low byte then
            // high byte of the divisor.
            unsafe {
                port::outb(COMMAND_PORT, COMMAND_SQUARE_WAVE);
                port::outb(CHANNEL0_PORT, divisor as u8);
                port::outb(CHANNEL0_PORT, (divisor >> 8) as u8);
            }
        });
        pic::unmask(0);
    }

    /// IRQ 0 handler.
    pub fn interrupt() {
        sched::tick();
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use active::{init, interrupt, TICK_HZ};
