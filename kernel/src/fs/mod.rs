//! Read-only filesystem
//!
//! The boot module is a contiguous image: one 4 KiB boot block (statistics
//! plus up to 63 directory entries of 64 bytes each), an inode array, then
//! 4 KiB data blocks. The reader is stateless over that slice; nothing here
//! writes or caches.

pub mod file;

use core::cmp::min;

use spin::Once;

use crate::error::{KernelError, KernelResult};

/// Filesystem block size in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// Directory-entry name field: zero-padded, not necessarily NUL-terminated.
pub const FILE_NAME_LENGTH: usize = 32;
/// The boot block holds at most this many directory entries.
pub const MAX_DIR_ENTRIES: usize = 63;

const DENTRY_SIZE: usize = 64;
/// Directory entries start after the 64-byte statistics header.
const DENTRY_TABLE_OFFSET: usize = 64;

/// File-type tag carried by every directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// User-level access to the real-time clock.
    Rtc,
    /// The directory itself.
    Directory,
    /// A regular file backed by an inode.
    Regular,
}

impl FileType {
    fn from_tag(tag: u32) -> KernelResult<Self> {
        match tag {
            0 => Ok(FileType::Rtc),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Regular),
            _ => Err(KernelError::CorruptImage),
        }
    }
}

/// A parsed directory entry.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; FILE_NAME_LENGTH],
    pub file_type: FileType,
    pub inode: u32,
}

/// Zero-pad a looked-up name to the full 32-byte field, or report that it
/// cannot match anything.
fn padded_name(name: &[u8]) -> Option<[u8; FILE_NAME_LENGTH]> {
    if name.len() > FILE_NAME_LENGTH {
        return None;
    }
    let mut padded = [0u8; FILE_NAME_LENGTH];
    padded[..name.len()].copy_from_slice(name);
    Some(padded)
}

/// Reader over an initialized filesystem image.
#[derive(Debug)]
pub struct FileSystem<'a> {
    image: &'a [u8],
}

impl<'a> FileSystem<'a> {
    /// Wrap an image, checking that the metadata it claims actually fits.
    pub fn new(image: &'a [u8]) -> KernelResult<Self> {
        if image.len() < BLOCK_SIZE {
            return Err(KernelError::CorruptImage);
        }
        let fs = Self { image };
        let metadata = (1 + fs.inode_count())
            .checked_mul(BLOCK_SIZE)
            .ok_or(KernelError::CorruptImage)?;
        if image.len() < metadata {
            return Err(KernelError::CorruptImage);
        }
        Ok(fs)
    }

    fn u32_at(&self, offset: usize) -> KernelResult<u32> {
        let bytes = self
            .image
            .get(offset..offset + 4)
            .ok_or(KernelError::CorruptImage)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Number of directory entries, capped at the boot block's capacity.
    pub fn dir_entry_count(&self) -> usize {
        let raw = u32::from_le_bytes([self.image[0], self.image[1], self.image[2], self.image[3]]);
        min(raw as usize, MAX_DIR_ENTRIES)
    }

    /// Number of inodes.
    pub fn inode_count(&self) -> usize {
        u32::from_le_bytes([self.image[4], self.image[5], self.image[6], self.image[7]]) as usize
    }

    /// Number of data blocks.
    pub fn data_block_count(&self) -> usize {
        u32::from_le_bytes([self.image[8], self.image[9], self.image[10], self.image[11]]) as usize
    }

    /// Look up a directory entry by position.
    pub fn dentry_by_index(&self, index: usize) -> KernelResult<DirEntry> {
        if index >= self.dir_entry_count() {
            return Err(KernelError::NotFound);
        }
        let base = DENTRY_TABLE_OFFSET + index * DENTRY_SIZE;
        let raw = self
            .image
            .get(base..base + DENTRY_SIZE)
            .ok_or(KernelError::CorruptImage)?;
        let mut name = [0u8; FILE_NAME_LENGTH];
        name.copy_from_slice(&raw[..FILE_NAME_LENGTH]);
        let file_type = FileType::from_tag(u32::from_le_bytes([
            raw[32], raw[33], raw[34], raw[35],
        ]))?;
        let inode = u32::from_le_bytes([raw[36], raw[37], raw[38], raw[39]]);
        Ok(DirEntry {
            name,
            file_type,
            inode,
        })
    }

    /// Look up a directory entry by name: equality over the whole
    /// zero-padded 32-byte field.
    pub fn dentry_by_name(&self, name: &[u8]) -> KernelResult<DirEntry> {
        let padded = padded_name(name).ok_or(KernelError::NotFound)?;
        for index in 0..self.dir_entry_count() {
            let entry = self.dentry_by_index(index)?;
            if entry.name == padded {
                return Ok(entry);
            }
        }
        Err(KernelError::NotFound)
    }

    /// Byte length of the file behind `inode`.
    pub fn file_len(&self, inode: u32) -> KernelResult<usize> {
        if inode as usize >= self.inode_count() {
            return Err(KernelError::BadInode { inode });
        }
        Ok(self.u32_at(self.inode_base(inode))? as usize)
    }

    fn inode_base(&self, inode: u32) -> usize {
        BLOCK_SIZE * (1 + inode as usize)
    }

    fn data_base(&self) -> usize {
        BLOCK_SIZE * (1 + self.inode_count())
    }

    /// Read up to `buf.len()` bytes of `inode` starting at `offset`.
    ///
    /// Returns the number of bytes copied: `min(buf.len(), length - offset)`
    /// inside the file, 0 at or past end of file. The end bound is clipped
    /// against the file length before any block arithmetic, so a request
    /// running past the end copies exactly the remaining bytes.
    pub fn read_file(&self, inode: u32, offset: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let length = self.file_len(inode)?;
        if offset >= length {
            return Ok(0);
        }
        let n = min(buf.len(), length - offset);
        let inode_base = self.inode_base(inode);
        let data_base = self.data_base();

        let mut copied = 0;
        while copied < n {
            let pos = offset + copied;
            let slot = pos / BLOCK_SIZE;
            let block_offset = pos % BLOCK_SIZE;
            let chunk = min(n - copied, BLOCK_SIZE - block_offset);
            let block = self.u32_at(inode_base + 4 + slot * 4)? as usize;
            // A corrupt block index must fail cleanly, not wrap.
            let src = block
                .checked_mul(BLOCK_SIZE)
                .and_then(|offset| offset.checked_add(data_base + block_offset))
                .ok_or(KernelError::CorruptImage)?;
            let end = src.checked_add(chunk).ok_or(KernelError::CorruptImage)?;
            let bytes = self.image.get(src..end).ok_or(KernelError::CorruptImage)?;
            buf[copied..copied + chunk].copy_from_slice(bytes);
            copied += chunk;
        }
        Ok(n)
    }

    /// Read the directory as if every name field (including ".") were
    /// concatenated into one file of 32-byte records.
    pub fn read_directory(&self, offset: usize, buf: &mut [u8]) -> usize {
        let total = self.dir_entry_count() * FILE_NAME_LENGTH;
        if offset >= total {
            return 0;
        }
        let n = min(buf.len(), total - offset);
        let mut copied = 0;
        while copied < n {
            let pos = offset + copied;
            let entry = pos / FILE_NAME_LENGTH;
            let name_offset = pos % FILE_NAME_LENGTH;
            let chunk = min(n - copied, FILE_NAME_LENGTH - name_offset);
            let base = DENTRY_TABLE_OFFSET + entry * DENTRY_SIZE + name_offset;
            buf[copied..copied + chunk].copy_from_slice(&self.image[base..base + chunk]);
            copied += chunk;
        }
        n
    }
}

static FS: Once<FileSystem<'static>> = Once::new();

/// Adopt the boot module as the global filesystem image.
pub fn init(image: &'static [u8]) -> KernelResult<()> {
    let fs = FileSystem::new(image)?;
    FS.call_once(|| fs);
    Ok(())
}

/// The global filesystem, once `init` has run.
pub fn get() -> KernelResult<&'static FileSystem<'static>> {
    FS.get().ok_or(KernelError::NotInitialized {
        subsystem: "filesystem",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;
    use std::vec::Vec;

    /// Build an image with ".", one regular file, and the RTC device node.
    /// The regular file's content is `content`, spread over as many data
    /// blocks as needed.
    fn build_image(name: &str, content: &[u8]) -> Vec<u8> {
        let data_blocks = content.len().div_ceil(BLOCK_SIZE).max(1);
        let num_inodes = 2usize;
        let mut image = vec![0u8; BLOCK_SIZE * (1 + num_inodes + data_blocks)];

        image[0..4].copy_from_slice(&3u32.to_le_bytes());
        image[4..8].copy_from_slice(&(num_inodes as u32).to_le_bytes());
        image[8..12].copy_from_slice(&(data_blocks as u32).to_le_bytes());

        let mut write_dentry = |index: usize, name: &[u8], file_type: u32, inode: u32| {
            let base = DENTRY_TABLE_OFFSET + index * DENTRY_SIZE;
            image[base..base + name.len()].copy_from_slice(name);
            image[base + 32..base + 36].copy_from_slice(&file_type.to_le_bytes());
            image[base + 36..base + 40].copy_from_slice(&inode.to_le_bytes());
        };
        write_dentry(0, b".", 1, 0);
        write_dentry(1, name.as_bytes(), 2, 1);
        write_dentry(2, b"rtc", 0, 0);

        // Inode 1 describes the regular file.
        let inode_base = BLOCK_SIZE * 2;
        image[inode_base..inode_base + 4].copy_from_slice(&(content.len() as u32).to_le_bytes());
        for block in 0..data_blocks {
            let slot = inode_base + 4 + block * 4;
            image[slot..slot + 4].copy_from_slice(&(block as u32).to_le_bytes());
        }

        let data_base = BLOCK_SIZE * (1 + num_inodes);
        image[data_base..data_base + content.len()].copy_from_slice(content);
        image
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn lookup_by_name_matches_padded_field() {
        let image = build_image("frame0.txt", b"hello");
        let fs = FileSystem::new(&image).unwrap();

        let entry = fs.dentry_by_name(b"frame0.txt").unwrap();
        assert_eq!(entry.file_type, FileType::Regular);
        assert_eq!(entry.inode, 1);

        // A prefix is not a match: the comparison spans the whole field.
        assert_eq!(fs.dentry_by_name(b"frame0").unwrap_err(), KernelError::NotFound);
        // Over-long names cannot match anything.
        let long = [b'x'; 33];
        assert_eq!(fs.dentry_by_name(&long).unwrap_err(), KernelError::NotFound);
    }

    #[test]
    fn lookup_by_index_bounds() {
        let image = build_image("a", b"x");
        let fs = FileSystem::new(&image).unwrap();
        assert_eq!(fs.dentry_by_index(0).unwrap().file_type, FileType::Directory);
        assert_eq!(fs.dentry_by_index(2).unwrap().file_type, FileType::Rtc);
        assert_eq!(fs.dentry_by_index(3).unwrap_err(), KernelError::NotFound);
    }

    #[test]
    fn read_file_clips_to_length() {
        let content = patterned(5000);
        let image = build_image("big", &content);
        let fs = FileSystem::new(&image).unwrap();

        // Whole file, oversized buffer.
        let mut buf = vec![0u8; 8192];
        assert_eq!(fs.read_file(1, 0, &mut buf).unwrap(), 5000);
        assert_eq!(&buf[..5000], &content[..]);

        // Read crossing the first block boundary.
        let mut buf = vec![0u8; 200];
        assert_eq!(fs.read_file(1, 4000, &mut buf).unwrap(), 200);
        assert_eq!(&buf[..], &content[4000..4200]);

        // Tail shorter than the request.
        let mut buf = vec![0u8; 100];
        assert_eq!(fs.read_file(1, 4950, &mut buf).unwrap(), 50);
        assert_eq!(&buf[..50], &content[4950..]);

        // At and past end of file.
        assert_eq!(fs.read_file(1, 5000, &mut buf).unwrap(), 0);
        assert_eq!(fs.read_file(1, 9000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_file_rejects_bad_inode() {
        let image = build_image("a", b"x");
        let fs = FileSystem::new(&image).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            fs.read_file(7, 0, &mut buf).unwrap_err(),
            KernelError::BadInode { inode: 7 }
        );
    }

    #[test]
    fn read_directory_concatenates_names() {
        let image = build_image("frame0.txt", b"hello");
        let fs = FileSystem::new(&image).unwrap();

        let mut buf = [0u8; 3 * FILE_NAME_LENGTH];
        assert_eq!(fs.read_directory(0, &mut buf), 3 * FILE_NAME_LENGTH);
        assert_eq!(&buf[..1], b".");
        assert_eq!(&buf[FILE_NAME_LENGTH..FILE_NAME_LENGTH + 10], b"frame0.txt");
        assert_eq!(&buf[2 * FILE_NAME_LENGTH..2 * FILE_NAME_LENGTH + 3], b"rtc");

        // Offset reads resume mid-name and clip at the end.
        let mut buf = [0u8; 64];
        assert_eq!(fs.read_directory(2 * FILE_NAME_LENGTH + 1, &mut buf), 31);
        assert_eq!(&buf[..2], b"tc");

        assert_eq!(fs.read_directory(3 * FILE_NAME_LENGTH, &mut buf), 0);
    }

    #[test]
    fn rejects_truncated_image() {
        assert_eq!(
            FileSystem::new(&[0u8; 64]).unwrap_err(),
            KernelError::CorruptImage
        );
        // Boot block claims more inodes than the image holds.
        let mut image = vec![0u8; BLOCK_SIZE];
        image[4..8].copy_from_slice(&4u32.to_le_bytes());
        assert_eq!(FileSystem::new(&image).unwrap_err(), KernelError::CorruptImage);
    }
}
