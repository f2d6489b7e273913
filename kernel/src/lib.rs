//! Trident Kernel Library
//!
//! A small preemptive multi-tasking kernel for 32-bit protected-mode x86:
//! a fixed pool of user processes with private address spaces, time-sliced
//! across three virtual terminals, with files reached through a uniform,
//! type-dispatched descriptor table.
//!
//! The crate builds two ways. For the machine (`--target
//! targets/i686-trident.json`) everything is compiled; on the host only
//! the architecture-independent layers are, so the parsing, scheduling,
//! terminal, and descriptor logic runs under the standard `#[test]`
//! harness.

#![no_std]
#![cfg_attr(all(target_arch = "x86", target_os = "none"), feature(abi_x86_interrupt))]

// Host target: pull in std so unit tests can allocate and assert normally.
#[cfg(not(target_os = "none"))]
extern crate std;

#[macro_use]
pub mod print;

pub mod arch;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;
pub mod terminal;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod log_service;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod serial;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod syscall;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod test_framework;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod timer;

// Re-export for the bare-metal integration tests
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use test_framework::{exit_qemu, test_panic_handler, QemuExitCode};
