//! Kernel error types
//!
//! Every fallible kernel layer returns [`KernelError`] and propagates with
//! `?`. Errors are collapsed to the `-1` system-call convention in exactly
//! one place, [`syscall_value`], so no partial success is ever reported as
//! success.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Null or non-user-accessible pointer handed in from user space
    BadAddress { addr: usize },

    /// File descriptor out of range or not backed by an open file
    BadDescriptor { fd: usize },

    /// Name resolution miss or directory index past the entry count
    NotFound,

    /// Inode index past the inode count
    BadInode { inode: u32 },

    /// Filesystem image is smaller than its own metadata claims
    CorruptImage,

    /// Descriptor table has no free slot
    TooManyOpen,

    /// Process pool is full
    ProcessLimit,

    /// Operation the device type does not provide
    NotSupported { operation: &'static str },

    /// File does not start with the executable magic
    NotExecutable,

    /// Argument outside the accepted range
    InvalidArgument { name: &'static str },

    /// Subsystem used before its `init()` ran
    NotInitialized { subsystem: &'static str },
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::BadAddress { addr } => {
                write!(f, "bad user address {addr:#x}")
            }
            KernelError::BadDescriptor { fd } => write!(f, "bad file descriptor {fd}"),
            KernelError::NotFound => write!(f, "no such file"),
            KernelError::BadInode { inode } => write!(f, "invalid inode {inode}"),
            KernelError::CorruptImage => write!(f, "corrupt filesystem image"),
            KernelError::TooManyOpen => write!(f, "descriptor table full"),
            KernelError::ProcessLimit => write!(f, "process pool full"),
            KernelError::NotSupported { operation } => {
                write!(f, "operation not supported: {operation}")
            }
            KernelError::NotExecutable => write!(f, "missing executable magic"),
            KernelError::InvalidArgument { name } => write!(f, "invalid argument: {name}"),
            KernelError::NotInitialized { subsystem } => {
                write!(f, "{subsystem} not initialized")
            }
        }
    }
}

/// Collapse a kernel result to the system-call ABI: the success value, or -1.
///
/// Resource-exhaustion failures leave a log line behind; everything else is
/// reported through the return value alone.
pub fn syscall_value(result: KernelResult<isize>) -> isize {
    match result {
        Ok(value) => value,
        Err(err) => {
            match err {
                KernelError::TooManyOpen | KernelError::ProcessLimit => {
                    log::warn!("syscall failed: {err}");
                }
                _ => log::debug!("syscall failed: {err}"),
            }
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_value_passes_success_through() {
        assert_eq!(syscall_value(Ok(42)), 42);
        assert_eq!(syscall_value(Ok(0)), 0);
    }

    #[test]
    fn syscall_value_collapses_errors() {
        assert_eq!(syscall_value(Err(KernelError::NotFound)), -1);
        assert_eq!(syscall_value(Err(KernelError::TooManyOpen)), -1);
        assert_eq!(syscall_value(Err(KernelError::BadDescriptor { fd: 9 })), -1);
    }
}
