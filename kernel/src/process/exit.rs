//! The `halt` path
//!
//! Tearing a process down is the mirror image of `execute`: free the slot,
//! close what it opened, restore the parent's address space and ring-0
//! stack, then jump through the parent's saved continuation so the
//! `execute` that started this child finally returns, carrying the status.
//! A top-level shell has no parent to return to and is simply replaced.

use super::execute;
use crate::arch::x86::{gdt, interrupts, usermode};
use crate::{mm, process, terminal};

/// Terminate the calling process with `status`. Never returns to the
/// caller: control continues either in the parent's `execute` or in a
/// replacement shell.
pub fn halt(status: u32) -> ! {
    interrupts::disable();

    let pid = match process::current() {
        Some(pid) => pid,
        // A halt with no process behind it means corrupted kernel state.
        None => terminal::fatal(" Halt Without A Process "),
    };

    // SAFETY: interrupts are disabled.
    let pcb = unsafe { process::pcb_mut(pid) };
    pcb.active = false;
    pcb.runnable = false;

    let Some(parent) = pcb.parent else {
        // The topmost shell gets replaced rather than mourned.
        log::info!("top-level shell on terminal {} exited", pcb.terminal);
        process::set_current(None);
        let _ = execute::execute(b"shell");
        terminal::fatal(" Could Not Restart The Shell ");
    };

    // SAFETY: interrupts are disabled; parent != pid.
    let parent_pcb = unsafe { process::pcb_mut(parent) };
    parent_pcb.runnable = true;
    parent_pcb.child_status = status;

    // Close side effects run while the dying process is still current.
    pcb.files.close_user_slots();

    mm::switch_to(parent);
    mm::clear_process_directory(pid);
    gdt::set_kernel_stack(parent_pcb.kernel_stack_top);
    process::set_current(Some(parent));

    // SAFETY: the parent's continuation was captured by its `execute`, its
    // directory and ring-0 stack are restored, and interrupts are off.
    unsafe { usermode::resume_parent(&parent_pcb.context, status) }
}
