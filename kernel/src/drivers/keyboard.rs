//! PS/2 keyboard driver
//!
//! Reads scancodes from I/O port 0x60 and decodes them via the
//! `pc_keyboard` crate (ScancodeSet1, US 104-key layout). Decoded bytes go
//! through line editing into the visible terminal's double-buffered line:
//! typing fills the input buffer while a reader may still be draining the
//! previously committed line.
//!
//! Two chords never reach the application: Ctrl-L clears the visible screen
//! and flushes the line, Alt-F1/F2/F3 switch the visible terminal.
//!
//! The whole interrupt body runs with interrupts disabled and the kernel
//! page directory loaded, so echoes land in physical video memory no matter
//! which process is scheduled.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, KeyState, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::arch::x86::{interrupts, pic, port};
use crate::error::{KernelError, KernelResult};
use crate::fs::file::FileOps;
use crate::sync::InterruptCell;
use crate::terminal::{self, MAX_TERMINALS};
use crate::{mm, process};

/// PS/2 data port.
const DATA_PORT: u16 = 0x60;
/// Keyboard request line on the master PIC.
const KEYBOARD_IRQ: u8 = 1;

/// Line buffer size; one line of input is at most this many bytes.
pub const LINE_BUF_SIZE: usize = 128;

/// Bitmask: Shift is held.
const MOD_SHIFT: u8 = 0x01;
/// Bitmask: Ctrl is held.
const MOD_CTRL: u8 = 0x02;
/// Bitmask: Alt is held.
const MOD_ALT: u8 = 0x04;

static MODIFIERS: AtomicU8 = AtomicU8::new(0);

/// Double-buffered line state for one terminal: `input` is the line being
/// typed, `pending` the last committed line a reader may drain.
struct LineBuffer {
    input: [u8; LINE_BUF_SIZE],
    len: usize,
    pending: [u8; LINE_BUF_SIZE],
    pending_len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            input: [0; LINE_BUF_SIZE],
            len: 0,
            pending: [0; LINE_BUF_SIZE],
            pending_len: 0,
        }
    }

    fn flush(&mut self) {
        self.input = [0; LINE_BUF_SIZE];
        self.len = 0;
        self.pending = [0; LINE_BUF_SIZE];
        self.pending_len = 0;
    }
}

static LINES: InterruptCell<[LineBuffer; MAX_TERMINALS]> = {
    const LINE: LineBuffer = LineBuffer::new();
    InterruptCell::new([LINE; MAX_TERMINALS])
};

/// Set when a terminal's pending line is complete; cleared by the reader.
static LINE_READY: [AtomicBool; MAX_TERMINALS] = {
    const READY: AtomicBool = AtomicBool::new(false);
    [READY; MAX_TERMINALS]
};

lazy_static! {
    static ref DECODER: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(
        Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore)
    );
}

/// Unmask the keyboard line. The decoder builds itself on first use.
pub fn init() {
    pic::unmask(KEYBOARD_IRQ);
}

/// IRQ 1 handler.
pub fn interrupt() {
    interrupts::without_interrupts(|| {
        // SAFETY: reading the data port pops the controller's output byte.
        let scancode = unsafe { port::inb(DATA_PORT) };

        // Write to physical video regardless of which process is scheduled.
        mm::switch_to_kernel();

        // The decoder lock is released before the key is acted on: a
        // terminal switch may suspend this stack to bootstrap a shell, and
        // that shell will take keyboard interrupts of its own.
        if let Some(key) = decode(scancode) {
            handle_key(key);
        }

        match process::current() {
            Some(pid) => mm::switch_to(pid),
            None => mm::switch_to_kernel(),
        }
    });
}

fn decode(scancode: u8) -> Option<DecodedKey> {
    let mut keyboard = DECODER.lock();
    let event = keyboard.add_byte(scancode).ok().flatten()?;

    let down = event.state == KeyState::Down;
    match event.code {
        KeyCode::LShift | KeyCode::RShift => update_modifier(MOD_SHIFT, down),
        KeyCode::LControl | KeyCode::RControl => update_modifier(MOD_CTRL, down),
        KeyCode::LAlt | KeyCode::RAltGr => update_modifier(MOD_ALT, down),
        _ => {}
    }
    keyboard.process_keyevent(event)
}

fn update_modifier(bit: u8, down: bool) {
    if down {
        MODIFIERS.fetch_or(bit, Ordering::Relaxed);
    } else {
        MODIFIERS.fetch_and(!bit, Ordering::Relaxed);
    }
}

fn handle_key(key: DecodedKey) {
    let mods = MODIFIERS.load(Ordering::Relaxed);

    if mods & MOD_ALT != 0 {
        let target = match key {
            DecodedKey::RawKey(KeyCode::F1) => Some(0),
            DecodedKey::RawKey(KeyCode::F2) => Some(1),
            DecodedKey::RawKey(KeyCode::F3) => Some(2),
            _ => None,
        };
        if let Some(target) = target {
            if let Err(err) = terminal::switch_visible(target) {
                log::warn!("terminal switch failed: {err}");
            }
        }
        return;
    }

    if mods & MOD_CTRL != 0 {
        if let DecodedKey::Unicode('l') | DecodedKey::Unicode('L') = key {
            control_l();
        }
        return;
    }

    if let DecodedKey::Unicode(ch) = key {
        match ch {
            '\u{8}' | '\u{7f}' => backspace(),
            '\r' | '\n' => key_input(b'\n'),
            _ if ch.is_ascii() => key_input(ch as u8),
            _ => {}
        }
    }
}

/// Ctrl-L: clear the visible screen, flush the line, and release any
/// blocked reader with an empty line.
fn control_l() {
    terminal::clear_visible();
    let t = terminal::visible();
    // SAFETY: interrupt body runs with interrupts disabled.
    unsafe { LINES.get_mut()[t].flush() };
    LINE_READY[t].store(true, Ordering::Release);
}

fn backspace() {
    let t = terminal::visible();
    // SAFETY: interrupt body runs with interrupts disabled.
    let line = unsafe { &mut LINES.get_mut()[t] };
    // Never backspace past the start of the line being typed.
    if line.len == 0 {
        return;
    }
    if terminal::backspace_visible() {
        line.len -= 1;
        line.input[line.len] = 0;
    }
}

fn key_input(byte: u8) {
    let t = terminal::visible();
    // SAFETY: interrupt body runs with interrupts disabled.
    let line = unsafe { &mut LINES.get_mut()[t] };

    if byte == b'\n' {
        terminal::putc(t, b'\n');
        // Commit the line, newline included when it fits. Committing
        // swaps buffers so typing may continue immediately.
        if line.len < LINE_BUF_SIZE {
            line.input[line.len] = b'\n';
            line.len += 1;
        }
        line.pending = line.input;
        line.pending_len = line.len;
        line.input = [0; LINE_BUF_SIZE];
        line.len = 0;
        LINE_READY[t].store(true, Ordering::Release);
        return;
    }

    if line.len < LINE_BUF_SIZE {
        terminal::putc(t, byte);
        line.input[line.len] = byte;
        line.len += 1;
    }
}

/// Blocking line read for `terminal`: spins, interrupts enabled, until a
/// line is committed *and* the terminal is visible, then drains up to one
/// line into `buf`.
pub fn read_line(terminal_index: usize, buf: &mut [u8]) -> KernelResult<usize> {
    if buf.is_empty() {
        return Err(KernelError::InvalidArgument { name: "nbytes" });
    }

    while !(LINE_READY[terminal_index].load(Ordering::Acquire)
        && terminal::visible() == terminal_index)
    {
        core::hint::spin_loop();
    }

    interrupts::without_interrupts(|| {
        // SAFETY: interrupts disabled for the drain.
        let line = unsafe { &mut LINES.get_mut()[terminal_index] };
        let mut copied = 0;
        while copied < buf.len() && copied < line.pending_len {
            buf[copied] = line.pending[copied];
            copied += 1;
            if buf[copied - 1] == b'\n' {
                break;
            }
        }
        // A full buffer committed without its newline still reads as a
        // terminated line when the caller has room for it.
        if copied == LINE_BUF_SIZE && copied < buf.len() && buf[copied - 1] != b'\n' {
            buf[copied] = b'\n';
            copied += 1;
        }
        line.pending = [0; LINE_BUF_SIZE];
        line.pending_len = 0;
        LINE_READY[terminal_index].store(false, Ordering::Release);
        Ok(copied)
    })
}

/// Drop all buffered state for `terminal`.
pub fn flush(terminal_index: usize) {
    interrupts::without_interrupts(|| {
        // SAFETY: interrupts disabled.
        unsafe { LINES.get_mut()[terminal_index].flush() };
        LINE_READY[terminal_index].store(false, Ordering::Release);
    });
}

/// Operation vector backing standard input.
pub struct KeyboardOps;

impl FileOps for KeyboardOps {
    fn open(&self) -> KernelResult<()> {
        flush(terminal::visible());
        Ok(())
    }

    fn read(&self, _inode: Option<u32>, _offset: usize, buf: &mut [u8]) -> KernelResult<usize> {
        read_line(process::current_terminal(), buf)
    }

    fn write(&self, _inode: Option<u32>, _offset: usize, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::NotSupported {
            operation: "write to keyboard",
        })
    }

    fn close(&self) -> KernelResult<()> {
        flush(terminal::visible());
        Ok(())
    }
}

pub static KEYBOARD_OPS: KeyboardOps = KeyboardOps;
