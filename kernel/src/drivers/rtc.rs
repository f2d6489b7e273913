//! Real-time clock driver
//!
//! The CMOS RTC supplies the periodic tick user programs pace themselves
//! against: `read` on the RTC device blocks until the next tick, `write`
//! of a 4-byte power-of-two frequency reprograms the divider. Each process
//! has its own wait flag; the interrupt handler releases every waiter at
//! once.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::x86::{interrupts, pic, port};
use crate::error::{KernelError, KernelResult};
use crate::fs::file::FileOps;
use crate::process::{self, MAX_PROCESSES};

const INDEX_PORT: u16 = 0x70;
const DATA_PORT: u16 = 0x71;

const REGISTER_A: u8 = 0x0A;
const REGISTER_B: u8 = 0x0B;
const REGISTER_C: u8 = 0x0C;
/// High bit of the index port: keep NMI disabled while indexing.
const NMI_DISABLE: u8 = 0x80;

/// Register B: periodic interrupt enable.
const PERIODIC_ENABLE: u8 = 0x40;

/// RTC request line (slave PIC).
const RTC_IRQ: u8 = 8;

/// Default tick rate on open.
pub const DEFAULT_FREQ: u32 = 2;
const MIN_FREQ: u32 = 2;
const MAX_FREQ: u32 = 1024;

/// One wait flag per process; set by a reader, cleared by the tick.
static WAITING: [AtomicBool; MAX_PROCESSES] = {
    const CLEAR: AtomicBool = AtomicBool::new(false);
    [CLEAR; MAX_PROCESSES]
};

/// Enable the periodic interrupt at the default rate and unmask the line.
pub fn init() {
    interrupts::without_interrupts(|| {
        // SAFETY: standard CMOS index/data protocol; a second index write
        // is needed because a data read resets the index.
        unsafe {
            port::outb(INDEX_PORT, NMI_DISABLE | REGISTER_B);
            let previous = port::inb(DATA_PORT);
            port::outb(INDEX_PORT, NMI_DISABLE | REGISTER_B);
            port::outb(DATA_PORT, previous | PERIODIC_ENABLE);
        }
    });
    let _ = set_frequency(DEFAULT_FREQ);
    pic::unmask(RTC_IRQ);
}

/// Program the periodic rate. Only powers of two in [2, 1024] are real
/// divider settings; anything else is rejected.
pub fn set_frequency(freq: u32) -> KernelResult<()> {
    if !(MIN_FREQ..=MAX_FREQ).contains(&freq) || !freq.is_power_of_two() {
        return Err(KernelError::InvalidArgument { name: "frequency" });
    }
    // freq = 32768 >> (rate - 1), so rate 15 is 2 Hz and rate 6 is 1024 Hz.
    let rate = (16 - freq.trailing_zeros()) as u8;
    interrupts::without_interrupts(|| {
        // SAFETY: rate lives in the low nibble of register A.
        unsafe {
            port::outb(INDEX_PORT, NMI_DISABLE | REGISTER_A);
            let previous = port::inb(DATA_PORT);
            port::outb(INDEX_PORT, NMI_DISABLE | REGISTER_A);
            port::outb(DATA_PORT, (previous & 0xF0) | rate);
        }
    });
    Ok(())
}

/// IRQ 8 handler: acknowledge the tick and release every waiter.
pub fn interrupt() {
    // SAFETY: register C must be read or the RTC will not raise another
    // interrupt; the value itself is uninteresting.
    unsafe {
        port::outb(INDEX_PORT, REGISTER_C);
        let _ = port::inb(DATA_PORT);
    }
    for flag in WAITING.iter() {
        flag.store(false, Ordering::Release);
    }
}

/// Block `pid` until the next tick. Spins with interrupts enabled; the
/// scheduler keeps the rest of the system running meanwhile.
pub fn wait_tick(pid: usize) {
    WAITING[pid].store(true, Ordering::Release);
    while WAITING[pid].load(Ordering::Acquire) {
        core::hint::spin_loop();
    }
}

/// Operation vector for the RTC device node.
pub struct RtcOps;

impl FileOps for RtcOps {
    fn open(&self) -> KernelResult<()> {
        set_frequency(DEFAULT_FREQ)
    }

    /// Returns 0 once the next tick has occurred.
    fn read(&self, _inode: Option<u32>, _offset: usize, _buf: &mut [u8]) -> KernelResult<usize> {
        let pid = process::current().ok_or(KernelError::NotInitialized {
            subsystem: "process",
        })?;
        wait_tick(pid);
        Ok(0)
    }

    /// Accepts exactly a 4-byte little-endian frequency.
    fn write(&self, _inode: Option<u32>, _offset: usize, buf: &[u8]) -> KernelResult<usize> {
        let bytes: [u8; 4] = buf
            .try_into()
            .map_err(|_| KernelError::InvalidArgument { name: "nbytes" })?;
        set_frequency(u32::from_le_bytes(bytes))?;
        Ok(buf.len())
    }
}

pub static RTC_OPS: RtcOps = RtcOps;
