//! Process control block
//!
//! One PCB per potential process, fixed at build time. A PCB owns the
//! process's descriptor table, its command-line tail, and the saved kernel
//! continuation; the 8 KiB kernel stack it pairs with is a fixed slice of
//! the kernel region just below 8 MiB, found by arithmetic rather than
//! allocation.

use crate::fs::file::DescriptorTable;
use crate::mm;

/// Command-line tail storage: one keyboard line plus its terminator.
pub const ARGS_SIZE: usize = 129;

/// Kernel stack pointer and frame pointer of a suspended process. Captured
/// as an explicit continuation by the context-switch and `execute` paths;
/// the callee-saved registers and the trap frame live on the stack it
/// points into.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct KernelContext {
    pub esp: u32,
    pub ebp: u32,
}

impl KernelContext {
    pub const fn empty() -> Self {
        Self { esp: 0, ebp: 0 }
    }
}

/// The kernel record describing one process.
pub struct Pcb {
    /// This slot backs a live process.
    pub active: bool,
    /// The scheduler may pick this process. Cleared on an ancestor while
    /// its child runs.
    pub runnable: bool,
    /// Logical terminal this process belongs to.
    pub terminal: usize,
    /// Parent process, `None` for a top-level shell.
    pub parent: Option<usize>,
    /// Saved kernel continuation from the last suspension.
    pub context: KernelContext,
    /// Value the TSS ring-0 stack pointer gets when this process next runs
    /// in ring 3.
    pub kernel_stack_top: u32,
    /// Virtual address of the first user instruction.
    pub entry_point: u32,
    /// The eight descriptor slots.
    pub files: DescriptorTable,
    /// NUL-terminated command-line tail for `getargs`.
    pub args: [u8; ARGS_SIZE],
    /// Exit status a departing child deposits for this process to read.
    pub child_status: u32,
}

impl Pcb {
    pub const fn new() -> Self {
        Self {
            active: false,
            runnable: false,
            terminal: 0,
            parent: None,
            context: KernelContext::empty(),
            kernel_stack_top: 0,
            entry_point: 0,
            files: DescriptorTable::new(),
            args: [0; ARGS_SIZE],
            child_status: 0,
        }
    }

    /// Return the slot to its pristine state before reuse.
    pub fn reset(&mut self) {
        *self = Pcb::new();
    }

    /// Store the command-line tail, truncated to fit, always terminated.
    pub fn set_args(&mut self, tail: &[u8]) {
        self.args = [0; ARGS_SIZE];
        let n = tail.len().min(ARGS_SIZE - 1);
        self.args[..n].copy_from_slice(&tail[..n]);
    }

    /// Length of the stored tail including its NUL terminator.
    pub fn args_len(&self) -> usize {
        let strlen = self
            .args
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(ARGS_SIZE - 1);
        strlen + 1
    }
}

/// Top of process `pid`'s ring-0 stack: the highest dword of its 8 KiB
/// region below the kernel-region end.
pub fn kernel_stack_top(pid: usize) -> u32 {
    mm::KERNEL_REGION_END - (pid as u32) * KERNEL_STACK_SIZE - 4
}

/// Per-process kernel stack size.
pub const KERNEL_STACK_SIZE: u32 = 8 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_stacks_descend_from_the_region_end() {
        assert_eq!(kernel_stack_top(0), 0x007F_FFFC);
        assert_eq!(kernel_stack_top(1), 0x007F_DFFC);
        assert_eq!(
            kernel_stack_top(1) - kernel_stack_top(2),
            KERNEL_STACK_SIZE
        );
    }

    #[test]
    fn args_are_truncated_and_terminated() {
        let mut pcb = Pcb::new();
        pcb.set_args(b"frame0.txt");
        assert_eq!(&pcb.args[..10], b"frame0.txt");
        assert_eq!(pcb.args[10], 0);
        assert_eq!(pcb.args_len(), 11);

        let long = [b'a'; 200];
        pcb.set_args(&long);
        assert_eq!(pcb.args[ARGS_SIZE - 1], 0);
        assert_eq!(pcb.args_len(), ARGS_SIZE);

        pcb.set_args(b"");
        assert_eq!(pcb.args_len(), 1);
    }
}
