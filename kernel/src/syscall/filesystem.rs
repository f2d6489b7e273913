//! File-oriented system calls
//!
//! Thin shells around the caller's descriptor table: validate the user
//! pointer, find the table, dispatch. The table does the polymorphism.

use super::{user_slice, user_slice_mut};
use crate::drivers::rtc::RTC_OPS;
use crate::error::{syscall_value, KernelError, KernelResult};
use crate::fs::file::{FileOps, DIRECTORY_OPS, REGULAR_FILE_OPS};
use crate::fs::{self, FileType, FILE_NAME_LENGTH};
use crate::process;

/// Operation vector for a file-type tag, chosen once at open time. The
/// descriptor table never looks at the type again.
pub fn vector_for(file_type: FileType) -> &'static dyn FileOps {
    match file_type {
        FileType::Rtc => &RTC_OPS,
        FileType::Directory => &DIRECTORY_OPS,
        FileType::Regular => &REGULAR_FILE_OPS,
    }
}

fn current_files() -> KernelResult<&'static mut crate::fs::file::DescriptorTable> {
    let pid = process::current().ok_or(KernelError::NotInitialized {
        subsystem: "process",
    })?;
    // SAFETY: a process's descriptor table is touched only from that
    // process's own kernel context; nothing else aliases it here.
    Ok(unsafe { &mut process::pcb_mut(pid).files })
}

pub fn sys_open(name_addr: u32) -> isize {
    syscall_value(open_impl(name_addr))
}

fn open_impl(name_addr: u32) -> KernelResult<isize> {
    // A valid name is at most one filename plus its terminator; anything
    // longer cannot resolve anyway.
    let raw = user_slice(name_addr, (FILE_NAME_LENGTH + 1) as u32)?;
    let len = raw
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(FILE_NAME_LENGTH + 1);
    let dentry = fs::get()?.dentry_by_name(&raw[..len])?;

    let inode = (dentry.file_type == FileType::Regular).then_some(dentry.inode);
    let fd = current_files()?.open(vector_for(dentry.file_type), inode)?;
    Ok(fd as isize)
}

pub fn sys_read(fd: u32, buf: u32, nbytes: u32) -> isize {
    syscall_value((|| {
        let buf = user_slice_mut(buf, nbytes)?;
        let n = current_files()?.read(fd as usize, buf)?;
        Ok(n as isize)
    })())
}

pub fn sys_write(fd: u32, buf: u32, nbytes: u32) -> isize {
    syscall_value((|| {
        let buf = user_slice(buf, nbytes)?;
        let n = current_files()?.write(fd as usize, buf)?;
        Ok(n as isize)
    })())
}

pub fn sys_close(fd: u32) -> isize {
    syscall_value((|| {
        current_files()?.close(fd as usize)?;
        Ok(0)
    })())
}
