//! Bare-metal test support
//!
//! The boot-level integration tests run on the real target under QEMU,
//! where the standard test harness does not exist. They report progress
//! over the serial line and end the run through QEMU's `isa-debug-exit`
//! device, so a test invocation is just a QEMU run whose exit status says
//! pass or fail:
//!
//! ```sh
//! qemu-system-i386 -kernel <test binary> \
//!     -device isa-debug-exit,iobase=0xf4,iosize=0x04 \
//!     -serial stdio -display none
//! ```
//!
//! With the device at iosize 4, QEMU exits with `(code << 1) | 1`:
//! [`QemuExitCode::Success`] becomes exit status 33.

use core::panic::PanicInfo;

use crate::arch::x86::port;

/// Exit codes written to the debug-exit device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Port the `isa-debug-exit` device is configured at.
const ISA_DEBUG_EXIT_PORT: u16 = 0xF4;

/// Terminate the QEMU instance with `exit_code`.
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    // SAFETY: a write to the isa-debug-exit port shuts the machine down;
    // on hardware without the device it is a harmless unused port.
    unsafe {
        port::outl(ISA_DEBUG_EXIT_PORT, exit_code as u32);
    }
    // Only reached when no debug-exit device is attached.
    crate::arch::x86::halt_forever()
}

/// Panic handler body for bare-metal test binaries.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    crate::serial_println!("[failed]");
    crate::serial_println!("Error: {info}");
    exit_qemu(QemuExitCode::Failed)
}
