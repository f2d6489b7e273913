//! Architecture support
//!
//! The kernel targets one architecture: 32-bit protected-mode x86. The
//! hardware-facing layers (port I/O, descriptor tables, interrupt plumbing,
//! ring transitions) live here; everything above this module is
//! architecture-independent and compiles on the host for testing.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod x86;
