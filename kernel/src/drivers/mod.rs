//! Device drivers

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod keyboard;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod rtc;
