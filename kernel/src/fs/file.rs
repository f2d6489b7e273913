//! Per-process descriptor table and operation vectors
//!
//! Every open file is a descriptor slot carrying a reference to a
//! type-specific operation vector, an optional inode, and a byte offset.
//! The vector is the whole of the polymorphism: the table dispatches
//! open/read/write/close blindly, so a new device type is a new [`FileOps`]
//! implementation and nothing else.

use crate::error::{KernelError, KernelResult};

/// Descriptors per process.
pub const MAX_FILES: usize = 8;
/// Slot 0: keyboard-backed standard input, read-only.
pub const STDIN_FD: usize = 0;
/// Slot 1: terminal-backed standard output, write-only.
pub const STDOUT_FD: usize = 1;

/// The four-operation capability bundle behind a descriptor.
///
/// `inode` and `offset` are meaningful only to seekable objects; vectors
/// over character devices ignore them. That uniformity is deliberate: the
/// dispatcher carries no per-type conditionals.
pub trait FileOps: Sync {
    /// Type-specific open side effect.
    fn open(&self) -> KernelResult<()> {
        Ok(())
    }

    fn read(&self, inode: Option<u32>, offset: usize, buf: &mut [u8]) -> KernelResult<usize>;

    fn write(&self, inode: Option<u32>, offset: usize, buf: &[u8]) -> KernelResult<usize>;

    /// Type-specific close side effect.
    fn close(&self) -> KernelResult<()> {
        Ok(())
    }
}

/// One slot of the descriptor table.
#[derive(Clone, Copy)]
pub struct Descriptor {
    ops: Option<&'static dyn FileOps>,
    inode: Option<u32>,
    offset: usize,
    in_use: bool,
}

impl Descriptor {
    const FREE: Descriptor = Descriptor {
        ops: None,
        inode: None,
        offset: 0,
        in_use: false,
    };
}

/// Reposition directive for [`DescriptorTable::seek`].
#[derive(Debug, Clone, Copy)]
pub enum Whence {
    /// Absolute position.
    Set,
    /// Relative to the current offset.
    Current,
}

/// The per-process table of eight descriptor slots.
pub struct DescriptorTable {
    slots: [Descriptor; MAX_FILES],
}

impl DescriptorTable {
    pub const fn new() -> Self {
        Self {
            slots: [Descriptor::FREE; MAX_FILES],
        }
    }

    /// Populate slots 0 and 1 at process start. They are installed by the
    /// kernel, not by user `open`, and user `close` cannot release them.
    pub fn install_std(
        &mut self,
        stdin: &'static dyn FileOps,
        stdout: &'static dyn FileOps,
    ) -> KernelResult<()> {
        stdin.open()?;
        self.slots[STDIN_FD] = Descriptor {
            ops: Some(stdin),
            inode: None,
            offset: 0,
            in_use: true,
        };
        stdout.open()?;
        self.slots[STDOUT_FD] = Descriptor {
            ops: Some(stdout),
            inode: None,
            offset: 0,
            in_use: true,
        };
        Ok(())
    }

    /// Install `ops` in the lowest free slot at or above 2 and run its open
    /// side effect. Nothing is consumed on failure.
    pub fn open(&mut self, ops: &'static dyn FileOps, inode: Option<u32>) -> KernelResult<usize> {
        let fd = (STDOUT_FD + 1..MAX_FILES)
            .find(|&fd| !self.slots[fd].in_use)
            .ok_or(KernelError::TooManyOpen)?;
        ops.open()?;
        self.slots[fd] = Descriptor {
            ops: Some(ops),
            inode,
            offset: 0,
            in_use: true,
        };
        Ok(fd)
    }

    fn checked(&self, fd: usize) -> KernelResult<&Descriptor> {
        // Strictly below the table size; the slot must be live.
        let slot = self
            .slots
            .get(fd)
            .ok_or(KernelError::BadDescriptor { fd })?;
        if !slot.in_use {
            return Err(KernelError::BadDescriptor { fd });
        }
        Ok(slot)
    }

    /// Dispatch a read and advance the offset by the bytes returned. A
    /// failing read leaves the offset untouched.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let slot = self.checked(fd)?;
        let (ops, inode, offset) = (slot.ops, slot.inode, slot.offset);
        let ops = ops.ok_or(KernelError::BadDescriptor { fd })?;
        let n = ops.read(inode, offset, buf)?;
        self.slots[fd].offset = offset + n;
        Ok(n)
    }

    /// Dispatch a write and advance the offset by the bytes returned.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> KernelResult<usize> {
        let slot = self.checked(fd)?;
        let (ops, inode, offset) = (slot.ops, slot.inode, slot.offset);
        let ops = ops.ok_or(KernelError::BadDescriptor { fd })?;
        let n = ops.write(inode, offset, buf)?;
        self.slots[fd].offset = offset + n;
        Ok(n)
    }

    /// Run the vector's close and free the slot. Stdin and stdout are not
    /// closable.
    pub fn close(&mut self, fd: usize) -> KernelResult<()> {
        if fd == STDIN_FD || fd == STDOUT_FD {
            return Err(KernelError::BadDescriptor { fd });
        }
        let slot = self.checked(fd)?;
        let ops = slot.ops.ok_or(KernelError::BadDescriptor { fd })?;
        ops.close()?;
        self.slots[fd] = Descriptor::FREE;
        Ok(())
    }

    /// Reposition `fd` and return the new offset.
    pub fn seek(&mut self, fd: usize, offset: isize, whence: Whence) -> KernelResult<usize> {
        self.checked(fd)?;
        let new_offset = match whence {
            Whence::Set => usize::try_from(offset)
                .map_err(|_| KernelError::InvalidArgument { name: "offset" })?,
            Whence::Current => self.slots[fd]
                .offset
                .checked_add_signed(offset)
                .ok_or(KernelError::InvalidArgument { name: "offset" })?,
        };
        self.slots[fd].offset = new_offset;
        Ok(new_offset)
    }

    /// Close every in-use slot above stdout. Used on process teardown;
    /// close side-effect failures are not recoverable there.
    pub fn close_user_slots(&mut self) {
        for fd in STDOUT_FD + 1..MAX_FILES {
            if self.slots[fd].in_use {
                if let Some(ops) = self.slots[fd].ops {
                    let _ = ops.close();
                }
                self.slots[fd] = Descriptor::FREE;
            }
        }
    }

    #[cfg(test)]
    fn offset_of(&self, fd: usize) -> usize {
        self.slots[fd].offset
    }
}

/// Operation vector for the directory file type: reading walks the name
/// fields, writing is not a thing a read-only filesystem does.
pub struct DirectoryOps;

impl FileOps for DirectoryOps {
    fn read(&self, _inode: Option<u32>, offset: usize, buf: &mut [u8]) -> KernelResult<usize> {
        Ok(super::get()?.read_directory(offset, buf))
    }

    fn write(&self, _inode: Option<u32>, _offset: usize, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::NotSupported {
            operation: "write to directory",
        })
    }
}

/// Operation vector for regular files.
pub struct RegularFileOps;

impl FileOps for RegularFileOps {
    fn read(&self, inode: Option<u32>, offset: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let inode = inode.ok_or(KernelError::InvalidArgument { name: "inode" })?;
        super::get()?.read_file(inode, offset, buf)
    }

    fn write(&self, _inode: Option<u32>, _offset: usize, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::NotSupported {
            operation: "write to read-only file",
        })
    }
}

pub static DIRECTORY_OPS: DirectoryOps = DirectoryOps;
pub static REGULAR_FILE_OPS: RegularFileOps = RegularFileOps;

#[cfg(test)]
mod tests {
    use super::*;

    /// Echo-style vector: reads and writes report the full buffer length.
    struct CountingOps;
    impl FileOps for CountingOps {
        fn read(&self, _i: Option<u32>, _o: usize, buf: &mut [u8]) -> KernelResult<usize> {
            Ok(buf.len())
        }
        fn write(&self, _i: Option<u32>, _o: usize, buf: &[u8]) -> KernelResult<usize> {
            Ok(buf.len())
        }
    }

    /// Vector whose every operation fails.
    struct FailingOps;
    impl FileOps for FailingOps {
        fn open(&self) -> KernelResult<()> {
            Err(KernelError::NotFound)
        }
        fn read(&self, _i: Option<u32>, _o: usize, _b: &mut [u8]) -> KernelResult<usize> {
            Err(KernelError::NotSupported { operation: "read" })
        }
        fn write(&self, _i: Option<u32>, _o: usize, _b: &[u8]) -> KernelResult<usize> {
            Err(KernelError::NotSupported { operation: "write" })
        }
    }

    static COUNTING: CountingOps = CountingOps;
    static FAILING: FailingOps = FailingOps;

    fn table_with_std() -> DescriptorTable {
        let mut table = DescriptorTable::new();
        table.install_std(&COUNTING, &COUNTING).unwrap();
        table
    }

    #[test]
    fn open_returns_lowest_free_fd_above_stdio() {
        let mut table = table_with_std();
        assert_eq!(table.open(&COUNTING, None).unwrap(), 2);
        assert_eq!(table.open(&COUNTING, Some(5)).unwrap(), 3);
        table.close(2).unwrap();
        // Freed slot is the lowest again.
        assert_eq!(table.open(&COUNTING, None).unwrap(), 2);
    }

    #[test]
    fn open_fails_when_table_full() {
        let mut table = table_with_std();
        for expected in 2..MAX_FILES {
            assert_eq!(table.open(&COUNTING, None).unwrap(), expected);
        }
        assert_eq!(
            table.open(&COUNTING, None).unwrap_err(),
            KernelError::TooManyOpen
        );
    }

    #[test]
    fn failed_open_side_effect_consumes_no_slot() {
        let mut table = table_with_std();
        assert!(table.open(&FAILING, None).is_err());
        // The slot that would have been consumed is still handed out.
        assert_eq!(table.open(&COUNTING, None).unwrap(), 2);
    }

    #[test]
    fn stdio_slots_are_not_closable() {
        let mut table = table_with_std();
        assert!(table.close(STDIN_FD).is_err());
        assert!(table.close(STDOUT_FD).is_err());
        // Both still work afterwards.
        let mut buf = [0u8; 4];
        assert_eq!(table.read(STDIN_FD, &mut buf).unwrap(), 4);
        assert_eq!(table.write(STDOUT_FD, &buf).unwrap(), 4);
    }

    #[test]
    fn fd_bounds_are_strict() {
        let mut table = table_with_std();
        let mut buf = [0u8; 1];
        assert!(table.read(MAX_FILES, &mut buf).is_err());
        assert!(table.write(MAX_FILES, &buf).is_err());
        assert!(table.close(MAX_FILES).is_err());
        // In range but never opened.
        assert!(table.read(5, &mut buf).is_err());
    }

    #[test]
    fn read_advances_offset_only_on_success() {
        struct WriteOnly;
        impl FileOps for WriteOnly {
            fn read(&self, _i: Option<u32>, _o: usize, _b: &mut [u8]) -> KernelResult<usize> {
                Err(KernelError::NotSupported { operation: "read" })
            }
            fn write(&self, _i: Option<u32>, _o: usize, buf: &[u8]) -> KernelResult<usize> {
                Ok(buf.len())
            }
        }
        static WRITE_ONLY: WriteOnly = WriteOnly;

        let mut table = table_with_std();
        let fd = table.open(&COUNTING, None).unwrap();
        let mut buf = [0u8; 10];
        table.read(fd, &mut buf).unwrap();
        table.read(fd, &mut buf[..5]).unwrap();
        assert_eq!(table.offset_of(fd), 15);

        let fd = table.open(&WRITE_ONLY, None).unwrap();
        table.write(fd, &buf).unwrap();
        assert!(table.read(fd, &mut buf).is_err());
        assert_eq!(table.offset_of(fd), 10);
    }

    #[test]
    fn write_failure_leaves_offset() {
        struct ReadOnly;
        impl FileOps for ReadOnly {
            fn read(&self, _i: Option<u32>, _o: usize, buf: &mut [u8]) -> KernelResult<usize> {
                Ok(buf.len())
            }
            fn write(&self, _i: Option<u32>, _o: usize, _b: &[u8]) -> KernelResult<usize> {
                Err(KernelError::NotSupported { operation: "write" })
            }
        }
        static READ_ONLY: ReadOnly = ReadOnly;

        let mut table = table_with_std();
        let fd = table.open(&READ_ONLY, None).unwrap();
        let mut buf = [0u8; 8];
        table.read(fd, &mut buf).unwrap();
        assert!(table.write(fd, &buf).is_err());
        assert_eq!(table.offset_of(fd), 8);
    }

    #[test]
    fn seek_set_and_relative() {
        let mut table = table_with_std();
        let fd = table.open(&COUNTING, None).unwrap();
        assert_eq!(table.seek(fd, 100, Whence::Set).unwrap(), 100);
        assert_eq!(table.seek(fd, 28, Whence::Current).unwrap(), 128);
        assert_eq!(table.seek(fd, -28, Whence::Current).unwrap(), 100);
        // Below zero is rejected and the offset is unchanged.
        assert!(table.seek(fd, -200, Whence::Current).is_err());
        assert_eq!(table.offset_of(fd), 100);
        assert!(table.seek(fd, -1, Whence::Set).is_err());
    }

    #[test]
    fn close_user_slots_spares_stdio() {
        let mut table = table_with_std();
        table.open(&COUNTING, None).unwrap();
        table.open(&COUNTING, None).unwrap();
        table.close_user_slots();
        let mut buf = [0u8; 2];
        assert!(table.read(2, &mut buf).is_err());
        assert_eq!(table.read(STDIN_FD, &mut buf).unwrap(), 2);
        assert_eq!(table.open(&COUNTING, None).unwrap(), 2);
    }
}
