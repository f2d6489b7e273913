//! Process-oriented system calls

use super::{check_user_range, user_slice_mut};
use crate::arch::x86::interrupts;
use crate::error::{syscall_value, KernelError, KernelResult};
use crate::process::{self, execute, exit, ARGS_SIZE};
use crate::{fs, mm};

/// Longest command line `execute` will look at: a full argument tail plus
/// a program name and the space between them.
const MAX_COMMAND_LEN: u32 = (ARGS_SIZE + fs::FILE_NAME_LENGTH + 1) as u32;

/// Terminate the calling process. The status is an 8-bit value; 256 is
/// reserved for exception-terminated programs.
pub fn sys_halt(status: u32) -> isize {
    exit::halt(status & 0xFF)
}

pub fn sys_execute(command_addr: u32) -> isize {
    syscall_value((|| {
        check_user_range(command_addr, 1)?;
        // The command is NUL-terminated in user memory. Copy it out byte
        // by byte, stopping at the terminator, the length bound, or the
        // edge of the caller's mapped pages.
        let mut command = [0u8; MAX_COMMAND_LEN as usize];
        let mut len = 0;
        while len < command.len() {
            let addr = command_addr + len as u32;
            if !mm::is_user_addr(addr) {
                break;
            }
            // SAFETY: the address was just validated user-accessible.
            let byte = unsafe { *(addr as *const u8) };
            if byte == 0 {
                break;
            }
            command[len] = byte;
            len += 1;
        }
        execute::execute(&command[..len])
    })())
}

/// Copy the stored argument tail, terminator included, into `buf`. Fails
/// when the tail does not fit.
pub fn sys_getargs(buf: u32, nbytes: u32) -> isize {
    syscall_value((|| {
        let dst = user_slice_mut(buf, nbytes)?;
        let pid = process::current().ok_or(KernelError::NotInitialized {
            subsystem: "process",
        })?;
        // SAFETY: own-process PCB read from our own syscall context.
        let pcb = unsafe { process::pcb_mut(pid) };
        let len = pcb.args_len();
        if len > dst.len() {
            return Err(KernelError::InvalidArgument { name: "nbytes" });
        }
        dst[..len].copy_from_slice(&pcb.args[..len]);
        Ok(0)
    })())
}

/// Map the caller's terminal surface at the fixed user video address and
/// write that address to `*out`.
pub fn sys_vidmap(out: u32) -> isize {
    syscall_value(vidmap_impl(out))
}

fn vidmap_impl(out: u32) -> KernelResult<isize> {
    check_user_range(out, 4)?;
    let pid = process::current().ok_or(KernelError::NotInitialized {
        subsystem: "process",
    })?;
    let terminal = process::current_terminal();
    interrupts::without_interrupts(|| mm::map_vidmap(pid, terminal));
    // SAFETY: the range was just validated user-writable.
    unsafe { *(out as *mut u32) = mm::VIDMAP_VA };
    Ok(mm::VIDMAP_VA as isize)
}
