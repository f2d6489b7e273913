//! Round-robin scheduler
//!
//! The timer tick walks the process pool forward from just past the
//! current process and hands the CPU to the first runnable PCB it finds.
//! The switch itself is nothing but a kernel-stack swap: the TSS ring-0
//! stack and page directory move to the incoming process, the outgoing
//! continuation is saved, and control resumes in whatever kernel frame the
//! incoming process last suspended in.

use crate::process::MAX_PROCESSES;

/// Election: the first runnable pid strictly after `current`, wrapping, or
/// `None` when nobody else can run. With no current process the scan
/// starts at 0.
pub fn pick_next(
    runnable: &[bool; MAX_PROCESSES],
    current: Option<usize>,
) -> Option<usize> {
    let start = match current {
        Some(pid) => pid + 1,
        None => 0,
    };
    (0..MAX_PROCESSES)
        .map(|i| (start + i) % MAX_PROCESSES)
        .filter(|&pid| Some(pid) != current)
        .find(|&pid| runnable[pid])
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod active {
    use super::pick_next;
    use crate::arch::x86::{context, gdt, interrupts, pic};
    use crate::{mm, process};

    /// Timer-driven tick. Infallible by construction: no allocation, only
    /// the preallocated pool.
    pub fn tick() {
        interrupts::disable();

        // Nothing to save into without a current process; the next
        // `execute` will install one.
        let Some(current) = process::current() else {
            return;
        };
        let Some(next) = pick_next(&process::runnable_flags(), Some(current)) else {
            return;
        };

        // The switch abandons this interrupt's unmask path until the
        // outgoing process is rescheduled; keep the clock, keyboard, and
        // RTC alive for everyone else meanwhile.
        pic::unmask(0);
        pic::unmask(1);
        pic::unmask(8);

        // SAFETY: interrupts are disabled across the whole switch.
        unsafe {
            let incoming = process::pcb_mut(next);
            gdt::set_kernel_stack(incoming.kernel_stack_top);
            mm::switch_to(next);
            process::set_current(Some(next));

            let outgoing = process::pcb_mut(current);
            context::context_switch(&mut outgoing.context, &incoming.context);
        }
        // Back on this stack: some later tick picked us again.
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use active::tick;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_next_runnable_in_ring_order() {
        let mut runnable = [false; MAX_PROCESSES];
        runnable[0] = true;
        runnable[3] = true;
        runnable[5] = true;
        assert_eq!(pick_next(&runnable, Some(0)), Some(3));
        assert_eq!(pick_next(&runnable, Some(3)), Some(5));
        // Wraps past the end back to the lowest pid.
        assert_eq!(pick_next(&runnable, Some(5)), Some(0));
    }

    #[test]
    fn skips_non_runnable_ancestors() {
        let mut runnable = [false; MAX_PROCESSES];
        runnable[2] = true;
        // 0 spawned 1 spawned 2: only the leaf is runnable.
        assert_eq!(pick_next(&runnable, Some(2)), None);
        runnable[7] = true;
        assert_eq!(pick_next(&runnable, Some(2)), Some(7));
    }

    #[test]
    fn sole_runnable_process_stays_put() {
        let mut runnable = [false; MAX_PROCESSES];
        runnable[4] = true;
        assert_eq!(pick_next(&runnable, Some(4)), None);
    }

    #[test]
    fn no_current_process_scans_from_zero() {
        let mut runnable = [false; MAX_PROCESSES];
        runnable[6] = true;
        assert_eq!(pick_next(&runnable, None), Some(6));
        assert_eq!(pick_next(&[false; MAX_PROCESSES], None), None);
    }
}
