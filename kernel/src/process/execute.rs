//! The `execute` path
//!
//! Loading a program is a straight line: parse the command, claim a PCB,
//! resolve and validate the executable, build a fresh address space, copy
//! the image into it, wire up the standard descriptors, and drop to ring 3
//! through a synthesized interrupt-return frame. The crooked part is the
//! return: `execute` for a child only "returns" when that child later calls
//! `halt`, which restores the continuation captured here.

use crate::error::{KernelError, KernelResult};
use crate::fs::FILE_NAME_LENGTH;

/// First bytes of every executable.
pub const EXEC_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
/// Byte offset of the little-endian entry-point address.
pub const ENTRY_POINT_OFFSET: usize = 24;
/// Header bytes needed to validate and locate the entry point.
pub const HEADER_LEN: usize = ENTRY_POINT_OFFSET + 4;

/// A parsed command line: program name and the argument tail.
#[derive(Debug, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a [u8],
    pub args: &'a [u8],
}

/// Split a command into its program name (at most one filename's worth of
/// bytes) and the argument tail, stripped of the spaces between them. A NUL
/// or newline ends the command wherever it appears.
pub fn parse_command(command: &[u8]) -> Command<'_> {
    let end = command
        .iter()
        .position(|&b| b == 0 || b == b'\n')
        .unwrap_or(command.len());
    let command = &command[..end];

    let name_start = command
        .iter()
        .position(|&b| b != b' ')
        .unwrap_or(command.len());
    let rest = &command[name_start..];
    let name_end = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
    let name = &rest[..name_end.min(FILE_NAME_LENGTH)];

    let tail = &rest[name_end..];
    let args_start = tail.iter().position(|&b| b != b' ').unwrap_or(tail.len());
    Command {
        name,
        args: &tail[args_start..],
    }
}

/// Check the executable magic and extract the entry point from a header.
pub fn parse_header(header: &[u8]) -> KernelResult<u32> {
    if header.len() < HEADER_LEN || header[..4] != EXEC_MAGIC {
        return Err(KernelError::NotExecutable);
    }
    Ok(u32::from_le_bytes([
        header[ENTRY_POINT_OFFSET],
        header[ENTRY_POINT_OFFSET + 1],
        header[ENTRY_POINT_OFFSET + 2],
        header[ENTRY_POINT_OFFSET + 3],
    ]))
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod active {
    use super::*;
    use crate::arch::x86::{gdt, interrupts, usermode};
    use crate::drivers::keyboard::KEYBOARD_OPS;
    use crate::process::{self, pcb, KernelContext};
    use crate::terminal::TERMINAL_OPS;
    use crate::{fs, mm};

    /// Load and run a program, handing it the CPU until it halts.
    ///
    /// Returns the child's halt status (0-255, or 256 for an
    /// exception-terminated child), or an error when the command cannot be
    /// executed — in which case no process slot, descriptor, or address
    /// space is consumed.
    pub fn execute(command: &[u8]) -> KernelResult<isize> {
        interrupts::disable();
        let caller = process::current();

        let parsed = parse_command(command);
        if parsed.name.is_empty() {
            return Err(KernelError::NotFound);
        }

        let pid = match process::next_free_slot(&process::active_flags(), caller) {
            Some(pid) => pid,
            None => {
                crate::println!("Already at maximum number of processes.");
                return Err(KernelError::ProcessLimit);
            }
        };
        let fs = fs::get()?;
        let dentry = fs.dentry_by_name(parsed.name)?;
        let mut header = [0u8; HEADER_LEN];
        let got = fs.read_file(dentry.inode, 0, &mut header)?;
        let entry = parse_header(&header[..got])?;

        let terminal = match caller {
            // SAFETY: interrupts are disabled.
            Some(parent) => unsafe { process::pcb_mut(parent) }.terminal,
            None => crate::terminal::visible(),
        };

        // From here on the new pid owns its directory and frame.
        mm::build_process_directory(pid, terminal);
        process::set_current(Some(pid));
        mm::switch_to(pid);

        // SAFETY: the fresh directory maps the program window writable.
        let image = unsafe {
            core::slice::from_raw_parts_mut(mm::PROGRAM_LOAD_VA as *mut u8, mm::MAX_IMAGE_BYTES)
        };
        if let Err(err) = fs.read_file(dentry.inode, 0, image) {
            process::set_current(caller);
            match caller {
                Some(parent) => mm::switch_to(parent),
                None => mm::switch_to_kernel(),
            }
            return Err(err);
        }

        // SAFETY: interrupts are disabled; `pid` was free and is now ours.
        let child = unsafe { process::pcb_mut(pid) };
        child.reset();
        child.active = true;
        child.runnable = true;
        child.terminal = terminal;
        child.parent = caller;
        child.entry_point = entry;
        child.kernel_stack_top = pcb::kernel_stack_top(pid);
        child.set_args(parsed.args);
        child.files.install_std(&KEYBOARD_OPS, &TERMINAL_OPS)?;

        // Suspend the caller: not schedulable until this child halts, and
        // its continuation is where `halt` will deliver the status.
        let resume = match caller {
            Some(parent) => {
                // SAFETY: interrupts are disabled; parent != pid.
                let parent_pcb = unsafe { process::pcb_mut(parent) };
                parent_pcb.runnable = false;
                &mut parent_pcb.context as *mut KernelContext
            }
            None => core::ptr::null_mut(),
        };

        // The next trap out of this program must land on its kernel stack.
        gdt::set_kernel_stack(child.kernel_stack_top);

        // SAFETY: directory, TSS, and image are in place; `resume` points
        // into the parent's PCB, which outlives the child.
        let status = unsafe { usermode::enter_user(entry, mm::USER_STACK_TOP, resume) };
        Ok(status as isize)
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use active::execute;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_name_and_args() {
        let parsed = parse_command(b"cat frame0.txt");
        assert_eq!(parsed.name, b"cat");
        assert_eq!(parsed.args, b"frame0.txt");
    }

    #[test]
    fn parse_strips_leading_and_separating_spaces() {
        let parsed = parse_command(b"   grep   very verbose  ");
        assert_eq!(parsed.name, b"grep");
        // Inner and trailing bytes of the tail are preserved verbatim.
        assert_eq!(parsed.args, b"very verbose  ");
    }

    #[test]
    fn parse_stops_at_newline_or_nul() {
        let parsed = parse_command(b"shell\nignored");
        assert_eq!(parsed.name, b"shell");
        assert_eq!(parsed.args, b"");

        let parsed = parse_command(b"ls\0junk");
        assert_eq!(parsed.name, b"ls");
        assert_eq!(parsed.args, b"");
    }

    #[test]
    fn parse_caps_the_name_at_a_filename() {
        let long = [b'x'; 40];
        let parsed = parse_command(&long);
        assert_eq!(parsed.name.len(), FILE_NAME_LENGTH);
    }

    #[test]
    fn parse_of_blank_command_is_empty() {
        let parsed = parse_command(b"   ");
        assert_eq!(parsed.name, b"");
        assert_eq!(parsed.args, b"");
    }

    #[test]
    fn header_magic_is_mandatory() {
        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&EXEC_MAGIC);
        header[ENTRY_POINT_OFFSET..].copy_from_slice(&0x0804_8094u32.to_le_bytes());
        assert_eq!(parse_header(&header).unwrap(), 0x0804_8094);

        header[0] = 0x7E;
        assert_eq!(parse_header(&header).unwrap_err(), KernelError::NotExecutable);
        // Too short to hold an entry point.
        assert_eq!(
            parse_header(&EXEC_MAGIC).unwrap_err(),
            KernelError::NotExecutable
        );
    }
}
