//! Process pool and lifecycle
//!
//! A dense, statically allocated array of [`Pcb`]s is the whole process
//! table; identifiers are indexes into it and never move. The pool, the
//! current-process variable, and the PCB flags are only ever touched inside
//! interrupt-disabled sections.

pub mod execute;
pub mod pcb;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod exit;

pub use pcb::{KernelContext, Pcb, ARGS_SIZE};

/// Size of the fixed process pool.
pub const MAX_PROCESSES: usize = 8;

/// Find the next free slot, scanning forward from just past `after` so a
/// freshly freed pid is not immediately reused by its own caller.
pub fn next_free_slot(active: &[bool; MAX_PROCESSES], after: Option<usize>) -> Option<usize> {
    let start = match after {
        Some(pid) => pid + 1,
        None => 0,
    };
    (0..MAX_PROCESSES)
        .map(|i| (start + i) % MAX_PROCESSES)
        .find(|&pid| !active[pid])
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod pool {
    use core::sync::atomic::{AtomicIsize, Ordering};

    use super::pcb::Pcb;
    use super::MAX_PROCESSES;
    use crate::arch::x86::{context, interrupts};
    use crate::sync::InterruptCell;

    /// The process pool. PCB `i` pairs with the kernel stack region ending
    /// at `KERNEL_REGION_END - i * 8 KiB`.
    static TABLE: InterruptCell<[Pcb; MAX_PROCESSES]> = {
        const PCB: Pcb = Pcb::new();
        InterruptCell::new([PCB; MAX_PROCESSES])
    };

    /// Identifier of the process that has the CPU, -1 between processes.
    /// Changes only in the scheduler, `execute`, and `halt`.
    static CURRENT: AtomicIsize = AtomicIsize::new(-1);

    /// The running process, if any.
    pub fn current() -> Option<usize> {
        let pid = CURRENT.load(Ordering::Relaxed);
        (pid >= 0).then_some(pid as usize)
    }

    /// Name the running process. Caller must have interrupts disabled.
    pub fn set_current(pid: Option<usize>) {
        CURRENT.store(pid.map_or(-1, |p| p as isize), Ordering::Relaxed);
    }

    /// Mutable access to one PCB.
    ///
    /// # Safety
    ///
    /// The caller must hold exclusive access to this PCB for the
    /// reference's lifetime: either interrupts are disabled, or the field
    /// touched (the descriptor table, the argument tail) is one that only
    /// the owning process's own kernel context ever reaches.
    pub unsafe fn pcb_mut(pid: usize) -> &'static mut Pcb {
        // SAFETY: per the caller's contract; distinct pids index distinct
        // array elements.
        unsafe { &mut TABLE.get_mut()[pid] }
    }

    /// Terminal of the running process, or the visible terminal when no
    /// process has the CPU yet.
    pub fn current_terminal() -> usize {
        match current() {
            // SAFETY: a momentary read of an immutable-for-now field.
            Some(pid) => interrupts::without_interrupts(|| unsafe { pcb_mut(pid) }.terminal),
            None => crate::terminal::visible(),
        }
    }

    /// Snapshot of the pool's `active` flags.
    pub fn active_flags() -> [bool; MAX_PROCESSES] {
        interrupts::without_interrupts(|| {
            let mut flags = [false; MAX_PROCESSES];
            for (pid, flag) in flags.iter_mut().enumerate() {
                // SAFETY: interrupts disabled.
                *flag = unsafe { pcb_mut(pid) }.active;
            }
            flags
        })
    }

    /// Snapshot of the pool's `runnable` flags.
    pub fn runnable_flags() -> [bool; MAX_PROCESSES] {
        interrupts::without_interrupts(|| {
            let mut flags = [false; MAX_PROCESSES];
            for (pid, flag) in flags.iter_mut().enumerate() {
                // SAFETY: interrupts disabled.
                *flag = unsafe { pcb_mut(pid) }.runnable;
            }
            flags
        })
    }

    /// Bootstrap a shell on the visible terminal from interrupt context.
    ///
    /// The interrupted process's continuation is captured first, so the
    /// scheduler can resume it later; the shell then takes the CPU through
    /// `execute` on this stack. Called by the terminal-switch path with
    /// interrupts disabled.
    pub fn spawn_visible_shell() {
        // Refuse before suspending anything if the pool is already full.
        if super::next_free_slot(&active_flags(), current()).is_none() {
            crate::println!("Cannot start a shell on this terminal: out of processes.");
            return;
        }
        match current() {
            Some(pid) => {
                // SAFETY: interrupts are disabled; the thunk never returns
                // and the continuation is resumed only by the scheduler.
                unsafe {
                    let context = &mut pcb_mut(pid).context as *mut context::KernelContext;
                    context::suspend_current(context, shell_thunk, 0);
                }
                // Resumed here when the scheduler picks the old process
                // again; the shell keeps running elsewhere.
            }
            None => shell_thunk(0),
        }
    }

    extern "C" fn shell_thunk(_unused: u32) -> ! {
        set_current(None);
        let _ = super::execute::execute(b"shell");
        // A parentless program never returns through its continuation.
        panic!("shell bootstrap returned");
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use pool::{
    active_flags, current, current_terminal, pcb_mut, runnable_flags, set_current,
    spawn_visible_shell,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_scans_past_the_caller() {
        let mut active = [false; MAX_PROCESSES];
        active[0] = true;
        // Caller 0: the scan starts at 1.
        assert_eq!(next_free_slot(&active, Some(0)), Some(1));
        // Wrap-around: everything past the caller busy.
        let mut active = [true; MAX_PROCESSES];
        active[2] = false;
        assert_eq!(next_free_slot(&active, Some(5)), Some(2));
    }

    #[test]
    fn allocation_without_a_caller_starts_at_zero() {
        let active = [false; MAX_PROCESSES];
        assert_eq!(next_free_slot(&active, None), Some(0));
    }

    #[test]
    fn full_pool_allocates_nothing() {
        let active = [true; MAX_PROCESSES];
        assert_eq!(next_free_slot(&active, Some(3)), None);
        assert_eq!(next_free_slot(&active, None), None);
    }
}
