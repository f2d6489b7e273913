//! Multi-terminal surface management
//!
//! Three logical terminals share the one physical text buffer. The visible
//! terminal's writes land in video memory; the other two own 4 KiB shadow
//! frames directly above it. Per-terminal page tables decide which frame a
//! process's video page points at, so "write to my terminal" is the same
//! store instruction no matter which terminal is visible; switching
//! terminals copies surfaces and re-aims those page tables instead of
//! touching any process.

pub mod screen;

pub use screen::{Cell, Screen, CELLS, COLS, ROWS};

/// Number of logical terminals.
pub const MAX_TERMINALS: usize = 3;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod manager {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::screen::{Cell, Screen, CELLS, COLS};
    use super::MAX_TERMINALS;
    use crate::arch::x86::{interrupts, pic, port};
    use crate::error::{KernelError, KernelResult};
    use crate::mm;
    use crate::sync::InterruptCell;

    /// Cursor and line state per terminal.
    static SCREENS: InterruptCell<[Screen; MAX_TERMINALS]> = {
        const SCREEN: Screen = Screen::new();
        InterruptCell::new([SCREEN; MAX_TERMINALS])
    };

    /// Which terminal currently owns the physical buffer.
    static VISIBLE: AtomicUsize = AtomicUsize::new(0);

    /// Terminals that have hosted a shell. Terminal 0's shell is launched
    /// by the boot path; the others start lazily on first switch.
    static SHELL_STARTED: InterruptCell<[bool; MAX_TERMINALS]> =
        InterruptCell::new([true, false, false]);

    const CURSOR_INDEX_PORT: u16 = 0x3D4;
    const CURSOR_DATA_PORT: u16 = 0x3D5;
    const CURSOR_HIGH: u8 = 0x0E;
    const CURSOR_LOW: u8 = 0x0F;

    /// The currently visible terminal index.
    pub fn visible() -> usize {
        VISIBLE.load(Ordering::Relaxed)
    }

    /// The video page at its fixed virtual address. Which physical frame
    /// this is depends on the live page directory: a process sees its own
    /// terminal's surface, the kernel directory sees the physical buffer.
    ///
    /// # Safety
    ///
    /// Caller must have interrupts disabled so no terminal switch re-aims
    /// the page mid-access.
    unsafe fn video_surface() -> &'static mut [Cell] {
        // SAFETY: the video page is mapped in every directory.
        unsafe { core::slice::from_raw_parts_mut(mm::VIDEO_PHYS as *mut Cell, CELLS) }
    }

    /// A specific physical frame as a surface. Only valid under the kernel
    /// directory, which identity-maps the buffer and all shadows.
    unsafe fn frame_surface(frame: u32) -> &'static mut [Cell] {
        // SAFETY: per the caller's contract.
        unsafe { core::slice::from_raw_parts_mut(frame as *mut Cell, CELLS) }
    }

    fn move_hardware_cursor(row: usize, col: usize) {
        let position = (row * COLS + col) as u16;
        // SAFETY: VGA cursor-position protocol on the CRTC ports.
        unsafe {
            port::outb(CURSOR_INDEX_PORT, CURSOR_LOW);
            port::outb(CURSOR_DATA_PORT, position as u8);
            port::outb(CURSOR_INDEX_PORT, CURSOR_HIGH);
            port::outb(CURSOR_DATA_PORT, (position >> 8) as u8);
        }
    }

    /// Write one byte to `terminal`'s surface through the video page. The
    /// hardware cursor follows only when that terminal is visible.
    pub fn putc(terminal: usize, byte: u8) {
        interrupts::without_interrupts(|| {
            // SAFETY: interrupts disabled; the video page of the current
            // directory is this terminal's surface.
            unsafe {
                let screen = &mut SCREENS.get_mut()[terminal];
                screen.put_byte(video_surface(), byte);
                if terminal == visible() {
                    let (row, col) = screen.cursor();
                    move_hardware_cursor(row, col);
                }
            }
        });
    }

    /// Write a buffer to `terminal`. Empty writes are rejected rather than
    /// silently succeeding.
    pub fn write_bytes(terminal: usize, bytes: &[u8]) -> KernelResult<usize> {
        if bytes.is_empty() {
            return Err(KernelError::InvalidArgument { name: "nbytes" });
        }
        for &byte in bytes {
            putc(terminal, byte);
        }
        Ok(bytes.len())
    }

    /// Erase the character behind the visible cursor. Runs under the kernel
    /// directory (keyboard path). Returns whether anything was erased.
    pub fn backspace_visible() -> bool {
        interrupts::without_interrupts(|| {
            // SAFETY: interrupts disabled; kernel directory maps the
            // physical buffer at the video address.
            unsafe {
                let screen = &mut SCREENS.get_mut()[visible()];
                let erased = screen.backspace(video_surface());
                let (row, col) = screen.cursor();
                move_hardware_cursor(row, col);
                erased
            }
        })
    }

    /// Clear the visible terminal. Runs under the kernel directory.
    pub fn clear_visible() {
        interrupts::without_interrupts(|| {
            // SAFETY: as in `backspace_visible`.
            unsafe {
                let screen = &mut SCREENS.get_mut()[visible()];
                screen.clear(video_surface());
                move_hardware_cursor(0, 0);
            }
        });
    }

    /// Make `new_terminal` visible: copy the physical buffer out to the
    /// outgoing terminal's shadow, the incoming shadow in, and re-aim both
    /// terminals' video pages. Starts a shell on a terminal that has never
    /// hosted one.
    pub fn switch_visible(new_terminal: usize) -> KernelResult<()> {
        if new_terminal >= MAX_TERMINALS {
            return Err(KernelError::InvalidArgument { name: "terminal" });
        }
        if new_terminal == visible() {
            return Ok(());
        }
        interrupts::without_interrupts(|| {
            let outgoing = visible();
            mm::switch_to_kernel();

            // SAFETY: interrupts disabled and the kernel directory is live,
            // so the physical buffer and both shadows are identity-mapped.
            unsafe {
                let shadow_out = frame_surface(mm::shadow_frame(outgoing));
                shadow_out.copy_from_slice(frame_surface(mm::VIDEO_PHYS));
                mm::aim_video_page(outgoing, mm::shadow_frame(outgoing));

                let shadow_in = frame_surface(mm::shadow_frame(new_terminal));
                frame_surface(mm::VIDEO_PHYS).copy_from_slice(shadow_in);
                mm::aim_video_page(new_terminal, mm::VIDEO_PHYS);

                VISIBLE.store(new_terminal, Ordering::Relaxed);
                let (row, col) = SCREENS.get_mut()[new_terminal].cursor();
                move_hardware_cursor(row, col);
            }

            // Re-aimed translations must not linger in the TLB.
            match crate::process::current() {
                Some(pid) => mm::switch_to(pid),
                None => mm::switch_to_kernel(),
            }

            // SAFETY: interrupts disabled for the started-shell bookkeeping.
            let needs_shell = unsafe {
                let started = SHELL_STARTED.get_mut();
                let needs = !started[new_terminal];
                started[new_terminal] = true;
                needs
            };
            if needs_shell {
                // The context switch below hands the CPU to a fresh shell;
                // make sure the clock keeps preempting it.
                pic::unmask(0);
                pic::unmask(1);
                pic::unmask(8);
                crate::process::spawn_visible_shell();
            }
            Ok(())
        })
    }

    /// Paint the diagnostic screen for an unrecoverable fault and stop the
    /// machine.
    pub fn fatal(message: &str) -> ! {
        interrupts::disable();
        mm::switch_to_kernel();
        log::error!("fatal: {message}");
        // White on blue, the classic way to say goodbye.
        const FATAL_ATTRIBUTE: u8 = 0x1F;
        // SAFETY: interrupts are off and the kernel directory is live.
        unsafe {
            let surface = frame_surface(mm::VIDEO_PHYS);
            for cell in surface.iter_mut() {
                *cell = Cell::new(b' ', FATAL_ATTRIBUTE);
            }
            let row = 11;
            let col = (COLS - message.len().min(COLS)) / 2;
            for (i, byte) in message.bytes().take(COLS).enumerate() {
                surface[row * COLS + col + i] = Cell::new(byte, FATAL_ATTRIBUTE);
            }
        }
        crate::arch::x86::halt_forever();
    }

    /// Boot-time screen reset, before any process exists.
    pub fn init() {
        clear_visible();
    }

    #[doc(hidden)]
    pub fn _print(args: core::fmt::Arguments) {
        use core::fmt::Write;

        struct TerminalWriter(usize);
        impl Write for TerminalWriter {
            fn write_str(&mut self, s: &str) -> core::fmt::Result {
                for byte in s.bytes() {
                    putc(self.0, byte);
                }
                Ok(())
            }
        }

        let _ = TerminalWriter(crate::process::current_terminal()).write_fmt(args);
    }

    /// Operation vector backing standard output: write-only, aimed at the
    /// calling process's own terminal surface.
    pub struct TerminalOps;

    impl crate::fs::file::FileOps for TerminalOps {
        fn read(
            &self,
            _inode: Option<u32>,
            _offset: usize,
            _buf: &mut [u8],
        ) -> KernelResult<usize> {
            Err(KernelError::NotSupported {
                operation: "read from terminal",
            })
        }

        fn write(&self, _inode: Option<u32>, _offset: usize, buf: &[u8]) -> KernelResult<usize> {
            write_bytes(crate::process::current_terminal(), buf)
        }
    }

    pub static TERMINAL_OPS: TerminalOps = TerminalOps;
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use manager::{
    _print, backspace_visible, clear_visible, fatal, init, putc, switch_visible, visible,
    write_bytes, TerminalOps, TERMINAL_OPS,
};
