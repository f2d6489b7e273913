//! End-to-end reads through the descriptor layer
//!
//! Builds a synthetic filesystem image, installs it as the global image,
//! and drives directory listings and file reads the way the `ls` and
//! `cat` programs do: through a descriptor table dispatching operation
//! vectors, 32 bytes or a buffer at a time, until end of file.

use trident_kernel::error::{KernelError, KernelResult};
use trident_kernel::fs::file::{
    DescriptorTable, FileOps, DIRECTORY_OPS, REGULAR_FILE_OPS,
};
use trident_kernel::fs::{self, FILE_NAME_LENGTH};

const BLOCK_SIZE: usize = 4096;
const DENTRY_SIZE: usize = 64;
const DENTRY_TABLE_OFFSET: usize = 64;

/// The regular file's content: larger than one block so reads cross a
/// block boundary.
fn file_content() -> Vec<u8> {
    (0..6000).map(|i| (i % 253) as u8).collect()
}

fn build_image() -> Vec<u8> {
    let content = file_content();
    let data_blocks = content.len().div_ceil(BLOCK_SIZE);
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
    write_dentry(1, b"frame0.txt", 2, 1);
    write_dentry(2, b"rtc", 0, 0);

    let inode_base = BLOCK_SIZE * 2;
    image[inode_base..inode_base + 4].copy_from_slice(&(content.len() as u32).to_le_bytes());
    for block in 0..data_blocks {
        let slot = inode_base + 4 + block * 4;
        image[slot..slot + 4].copy_from_slice(&(block as u32).to_le_bytes());
    }

    let data_base = BLOCK_SIZE * (1 + num_inodes);
    image[data_base..data_base + content.len()].copy_from_slice(&content);
    image
}

fn setup() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let image = build_image().into_boxed_slice();
        fs::init(Box::leak(image)).expect("synthetic image is well-formed");
    });
}

/// Stand-ins for the keyboard/terminal vectors, which need hardware.
struct NullOps;
impl FileOps for NullOps {
    fn read(&self, _i: Option<u32>, _o: usize, _b: &mut [u8]) -> KernelResult<usize> {
        Ok(0)
    }
    fn write(&self, _i: Option<u32>, _o: usize, buf: &[u8]) -> KernelResult<usize> {
        Ok(buf.len())
    }
}
static NULL_OPS: NullOps = NullOps;

fn table() -> DescriptorTable {
    let mut table = DescriptorTable::new();
    table.install_std(&NULL_OPS, &NULL_OPS).unwrap();
    table
}

#[test]
fn directory_listing_covers_every_entry_in_order() {
    setup();
    let mut table = table();
    let fd = table.open(&DIRECTORY_OPS, None).unwrap();

    // One name per read, the way `ls` walks a directory.
    let mut names = Vec::new();
    loop {
        let mut buf = [0u8; FILE_NAME_LENGTH];
        let n = table.read(fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        assert_eq!(n, FILE_NAME_LENGTH);
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        names.push(String::from_utf8_lossy(&buf[..end]).into_owned());
    }
    assert_eq!(names, [".", "frame0.txt", "rtc"]);
    table.close(fd).unwrap();
}

#[test]
fn file_reads_back_verbatim_through_the_table() {
    setup();
    let content = file_content();
    let dentry = fs::get().unwrap().dentry_by_name(b"frame0.txt").unwrap();

    let mut table = table();
    let fd = table.open(&REGULAR_FILE_OPS, Some(dentry.inode)).unwrap();

    // Odd-sized chunks so reads straddle the block boundary.
    let mut collected = Vec::new();
    loop {
        let mut buf = [0u8; 1000];
        let n = table.read(fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(collected, content);

    // The offset sits at end of file; further reads keep returning 0.
    let mut buf = [0u8; 16];
    assert_eq!(table.read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn failed_resolution_consumes_no_descriptor() {
    setup();
    let fs = fs::get().unwrap();
    assert_eq!(
        fs.dentry_by_name(b"nosuchfile").unwrap_err(),
        KernelError::NotFound
    );

    // The next successful open gets the fd the failed one would have.
    let mut table = table();
    let fd = table.open(&DIRECTORY_OPS, None).unwrap();
    assert_eq!(fd, 2);
}

#[test]
fn device_node_resolves_with_its_type_tag() {
    setup();
    let fs = fs::get().unwrap();
    let dentry = fs.dentry_by_name(b"rtc").unwrap();
    assert_eq!(dentry.file_type, trident_kernel::fs::FileType::Rtc);
}
