//! Inode I/O: loading and storing a single inode given its number.
//!
//! Grounded in `mkfs::ext2`'s `INode`/`BlockGroupDescriptor` read/write
//! pattern: a `#[repr(C)]` struct is reinterpreted as a raw byte slice and
//! copied in and out of a sector buffer, rather than hand-rolling a
//! byte-by-byte encoder.

use crate::device::BlockDevice;
use crate::error::{Errno, Result};
use crate::layout::{inode_location, MAX_SECTORS_PER_FILE, SECTOR_SIZE};
use std::mem::size_of;

/// The type of file an inode describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum FileType {
    File = 0,
    Dir = 1,
}

impl FileType {
    fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::File),
            1 => Some(Self::Dir),
            _ => None,
        }
    }
}

/// A fixed-size on-disk inode record.
///
/// For a file, `size` is the length in bytes. For a directory, `size` is the
/// number of valid directory entries stored across `data`. `data[k]` is
/// either `0` (unallocated slot) or a data-sector index.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Inode {
    pub size: i32,
    pub file_type: i32,
    pub data: [i32; MAX_SECTORS_PER_FILE],
}

impl Inode {
    /// Builds a freshly zeroed inode of the given type.
    pub fn new(file_type: FileType) -> Self {
        Self {
            size: 0,
            file_type: file_type as i32,
            data: [0; MAX_SECTORS_PER_FILE],
        }
    }

    /// Returns the inode's file type, or `None` if the stored tag is
    /// corrupted.
    pub fn kind(&self) -> Option<FileType> {
        FileType::from_raw(self.file_type)
    }

    /// Returns the inode reinterpreted as its raw byte representation.
    fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self as *const _ as *const u8, size_of::<Self>()) }
    }

    /// Returns the inode reinterpreted as its raw byte representation, for
    /// in-place mutation through a sector buffer.
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self as *mut _ as *mut u8, size_of::<Self>()) }
    }

    fn zeroed() -> Self {
        Self {
            size: 0,
            file_type: 0,
            data: [0; MAX_SECTORS_PER_FILE],
        }
    }
}

/// Reads inode `n`, returning it along with the sector buffer it lives in so
/// that a caller mutating it can write the same sector back with
/// [`store_inode`].
pub fn load_inode(dev: &mut dyn BlockDevice, n: u32) -> Result<([u8; SECTOR_SIZE], Inode)> {
    let (sector, offset) = inode_location(n);
    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_sector(sector, &mut buf)?;

    let mut inode = Inode::zeroed();
    inode
        .as_bytes_mut()
        .copy_from_slice(&buf[offset..offset + size_of::<Inode>()]);
    Ok((buf, inode))
}

/// Writes `inode` back into `buf` at its offset within the sector, then
/// persists the sector at inode `n`'s location.
pub fn store_inode(
    dev: &mut dyn BlockDevice,
    n: u32,
    buf: &mut [u8; SECTOR_SIZE],
    inode: &Inode,
) -> Result<()> {
    let (sector, offset) = inode_location(n);
    buf[offset..offset + size_of::<Inode>()].copy_from_slice(inode.as_bytes());
    dev.write_sector(sector, buf)?;
    Ok(())
}

/// Loads inode `n` directly, without exposing its owning sector buffer.
pub fn read_inode(dev: &mut dyn BlockDevice, n: u32) -> Result<Inode> {
    Ok(load_inode(dev, n)?.1)
}

/// Loads, mutates through `f`, then stores inode `n` back to disk.
pub fn update_inode<F>(dev: &mut dyn BlockDevice, n: u32, f: F) -> Result<()>
where
    F: FnOnce(&mut Inode),
{
    let (mut buf, mut inode) = load_inode(dev, n)?;
    f(&mut inode);
    store_inode(dev, n, &mut buf, &inode)
}

/// Number of sectors the first `size` bytes (file) or the first `size`
/// entries (directory, accounted by the caller in entries-per-sector units)
/// occupy. Shared helper for both file byte-ranges and directory entry
/// groups, mirroring how `ceil_division` is used throughout `mkfs::ext2`.
pub fn sectors_for_bytes(size: usize) -> usize {
    crate::layout::ceil_division(size, SECTOR_SIZE)
}

/// Validates that `file_type` matches `expected`, translating a mismatch into
/// [`Errno::General`] on a wrong-type unlink.
pub fn expect_type(inode: &Inode, expected: FileType) -> Result<()> {
    match inode.kind() {
        Some(kind) if kind == expected => Ok(()),
        _ => Err(Errno::General),
    }
}
