//! Synchronization primitives for a uniprocessor kernel
//!
//! The interrupt-disabled critical section is the only mutual-exclusion
//! mechanism this kernel needs: there is one CPU, and concurrency arises
//! exclusively from hardware interrupts. [`InterruptCell`] wraps the global
//! structures that are touched from both process context and interrupt
//! handlers; every access must happen with interrupts disabled.

use core::cell::UnsafeCell;

/// Interior-mutable storage for a uniprocessor global.
///
/// The cell itself performs no locking. Exclusion is the caller's contract:
/// a mutable reference may only be taken while interrupts are disabled (or
/// before interrupts are first enabled during boot), which on a single CPU
/// guarantees there is no other observer.
#[repr(transparent)]
pub struct InterruptCell<T> {
    inner: UnsafeCell<T>,
}

// SAFETY: access is serialized by the interrupts-disabled contract on
// `get_mut`; there is a single CPU and no other source of concurrency.
unsafe impl<T> Sync for InterruptCell<T> {}

impl<T> InterruptCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
        }
    }

    /// Get a mutable reference to the contents.
    ///
    /// # Safety
    ///
    /// Interrupts must be disabled for the whole lifetime of the returned
    /// reference, and the caller must not create a second reference through
    /// this cell while it lives.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        // SAFETY: exclusivity is guaranteed by the caller per the contract
        // above.
        unsafe { &mut *self.inner.get() }
    }

    /// Raw pointer to the contents, for handing a fixed address to hardware
    /// (page-directory register, descriptor-table registers).
    pub fn as_ptr(&self) -> *mut T {
        self.inner.get()
    }
}
