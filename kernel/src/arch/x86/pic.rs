//! 8259A programmable interrupt controller
//!
//! Two cascaded PICs remapped so that IRQ 0-15 arrive at vectors 0x20-0x2F.
//! The mask registers are shadowed in kernel memory and only ever written
//! inside interrupt-disabled sections.

use super::{interrupts, port};
use crate::sync::InterruptCell;

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_COMMAND: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

/// ICW1: edge-triggered, cascade, ICW4 needed.
const ICW1_INIT: u8 = 0x11;
/// ICW2: vector base for the master (IRQ 0-7).
pub const MASTER_VECTOR_BASE: u8 = 0x20;
/// ICW2: vector base for the slave (IRQ 8-15).
const SLAVE_VECTOR_BASE: u8 = 0x28;
/// ICW3: slave wired to master line 2.
const ICW3_MASTER: u8 = 0x04;
const ICW3_SLAVE: u8 = 0x02;
/// ICW4: 8086 mode.
const ICW4_8086: u8 = 0x01;

const EOI: u8 = 0x20;

/// Number of request lines across both controllers.
pub const NUM_LINES: u8 = 16;

/// Cascade line on the master; masking it silences the whole slave.
const CASCADE_LINE: u8 = 2;

/// Shadow copies of the two interrupt mask registers.
static MASKS: InterruptCell<[u8; 2]> = InterruptCell::new([0xFF, 0xFF]);

/// Remap both controllers and mask every line except the cascade.
pub fn init() {
    interrupts::without_interrupts(|| {
        // SAFETY: standard 8259 initialization sequence on the well-known
        // command/data ports; interrupts are disabled for the duration.
        unsafe {
            port::outb(MASTER_DATA, 0xFF);
            port::outb(SLAVE_DATA, 0xFF);

            port::outb(MASTER_COMMAND, ICW1_INIT);
            port::outb(MASTER_DATA, MASTER_VECTOR_BASE);
            port::outb(MASTER_DATA, ICW3_MASTER);
            port::outb(MASTER_DATA, ICW4_8086);

            port::outb(SLAVE_COMMAND, ICW1_INIT);
            port::outb(SLAVE_DATA, SLAVE_VECTOR_BASE);
            port::outb(SLAVE_DATA, ICW3_SLAVE);
            port::outb(SLAVE_DATA, ICW4_8086);

            let masks = MASKS.get_mut();
            masks[0] = 0xFF;
            masks[1] = 0xFF;
            port::outb(MASTER_DATA, masks[0]);
            port::outb(SLAVE_DATA, masks[1]);
        }
        unmask(CASCADE_LINE);
    });
}

/// Signal end-of-interrupt for `line`. Slave lines notify both controllers.
pub fn end_of_interrupt(line: u8) {
    debug_assert!(line < NUM_LINES);
    // SAFETY: EOI writes to the command ports are always permitted.
    unsafe {
        if line >= 8 {
            port::outb(SLAVE_COMMAND, EOI);
        }
        port::outb(MASTER_COMMAND, EOI);
    }
}

/// Mask (disable) a single request line.
pub fn mask(line: u8) {
    debug_assert!(line < NUM_LINES);
    interrupts::without_interrupts(|| {
        // SAFETY: interrupts are disabled; the shadow mask and the data port
        // are updated together.
        unsafe {
            let masks = MASKS.get_mut();
            if line < 8 {
                masks[0] |= 1 << line;
                port::outb(MASTER_DATA, masks[0]);
            } else {
                masks[1] |= 1 << (line - 8);
                port::outb(SLAVE_DATA, masks[1]);
            }
        }
    });
}

/// Unmask (enable) a single request line.
pub fn unmask(line: u8) {
    debug_assert!(line < NUM_LINES);
    interrupts::without_interrupts(|| {
        // SAFETY: interrupts are disabled; the shadow mask and the data port
        // are updated together.
        unsafe {
            let masks = MASKS.get_mut();
            if line < 8 {
                masks[0] &= !(1 << line);
                port::outb(MASTER_DATA, masks[0]);
            } else {
                masks[1] &= !(1 << (line - 8));
                port::outb(SLAVE_DATA, masks[1]);
            }
        }
    });
}
