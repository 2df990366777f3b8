//! Namespace mutators: create and unlink files and directories, built on
//! top of the bitmap allocator, inode I/O, directory operations and the
//! path resolver.

use crate::bitmap;
use crate::device::BlockDevice;
use crate::error::{Errno, Result};
use crate::inode::{self, FileType, Inode};
use crate::layout::{
    INODE_BITMAP_SECTORS, INODE_BITMAP_START, MAX_FILES, ROOT_INODE, SECTOR_BITMAP_SECTORS,
    SECTOR_BITMAP_START,
};
use crate::openfile::{self, OpenFileEntry};
use crate::{dirent, path};

/// Creates a new file or directory at `path`.
///
/// Every failure along the way — missing intermediate directory, invalid
/// name, the target already existing, or an I/O fault in any of the
/// bitmap/inode steps in between — is reported as [`Errno::Create`], per
/// spec's "parent missing / already exists / IO error during create" all
/// folding into one kind. The one exception is a failure to grow the
/// parent directory itself: that surfaces its own [`Errno::FileTooBig`] /
/// [`Errno::NoSpace`], since those are spec'd error kinds in their own
/// right rather than generic create failures.
pub fn create(dev: &mut dyn BlockDevice, file_type: FileType, path: &str) -> Result<()> {
    let res = path::resolve(dev, path).map_err(|_| Errno::Create)?;
    if res.child.is_some() {
        return Err(Errno::Create);
    }

    let bit = bitmap::first_unused(dev, INODE_BITMAP_START, INODE_BITMAP_SECTORS, MAX_FILES)
        .map_err(|_| Errno::Create)?;
    if bit < 0 {
        return Err(Errno::Create);
    }
    let new_inode_num = bit as u32;
    let new_inode = Inode::new(file_type);
    let (mut nbuf, _) = inode::load_inode(dev, new_inode_num).map_err(|_| Errno::Create)?;
    inode::store_inode(dev, new_inode_num, &mut nbuf, &new_inode).map_err(|_| Errno::Create)?;

    let (mut pbuf, mut parent_inode) = inode::load_inode(dev, res.parent).map_err(|_| Errno::Create)?;
    match dirent::append_child(dev, &mut parent_inode, &res.last_name, new_inode_num) {
        Ok(()) => inode::store_inode(dev, res.parent, &mut pbuf, &parent_inode).map_err(|_| Errno::Create),
        Err(e) => {
            // The inode bit was claimed above but never linked into the
            // namespace: release it so this failure doesn't leak it.
            bitmap::reset(dev, INODE_BITMAP_START, INODE_BITMAP_SECTORS, bit as usize)
                .map_err(|_| Errno::Create)?;
            Err(match e {
                Errno::FileTooBig | Errno::NoSpace => e,
                _ => Errno::Create,
            })
        }
    }
}

/// Unlinks a file or directory at `path`.
///
/// Only a `path` that resolves cleanly but whose final component is absent
/// is reported as `Errno::NoSuchFile`/`Errno::NoSuchDir`; any failure
/// *during* resolution (invalid name, missing intermediate directory, or a
/// genuine I/O fault reading a sector) propagates as whatever
/// [`path::resolve`] returned — [`Errno::General`] — rather than being
/// folded into the "missing" kind.
pub fn unlink(
    dev: &mut dyn BlockDevice,
    open_files: &[OpenFileEntry; crate::layout::MAX_OPEN_FILES],
    file_type: FileType,
    path: &str,
) -> Result<()> {
    let not_found = match file_type {
        FileType::Dir => Errno::NoSuchDir,
        FileType::File => Errno::NoSuchFile,
    };

    let res = path::resolve(dev, path)?;
    let child = res.child.ok_or(not_found)?;

    if child == ROOT_INODE {
        return Err(Errno::RootDir);
    }
    if openfile::is_open(open_files, child) {
        return Err(Errno::FileInUse);
    }

    remove_inode(dev, file_type, res.parent, child)
}

/// Frees a child inode's data sectors and inode slot, then detaches it from
/// its parent directory.
fn remove_inode(dev: &mut dyn BlockDevice, file_type: FileType, parent: u32, child: u32) -> Result<()> {
    let mut child_inode = inode::read_inode(dev, child)?;
    inode::expect_type(&child_inode, file_type).map_err(|_| Errno::General)?;
    if file_type == FileType::Dir && child_inode.size != 0 {
        return Err(Errno::DirNotEmpty);
    }

    for slot in child_inode.data.iter_mut() {
        if *slot != 0 {
            bitmap::reset(dev, SECTOR_BITMAP_START, SECTOR_BITMAP_SECTORS, *slot as usize)?;
            *slot = 0;
        }
    }
    child_inode.size = 0;
    let (mut cbuf, _) = inode::load_inode(dev, child)?;
    inode::store_inode(dev, child, &mut cbuf, &child_inode)?;
    bitmap::reset(dev, INODE_BITMAP_START, INODE_BITMAP_SECTORS, child as usize)?;

    let (mut pbuf, mut parent_inode) = inode::load_inode(dev, parent)?;
    dirent::remove_child(dev, &mut parent_inode, child)?;
    inode::store_inode(dev, parent, &mut pbuf, &parent_inode)?;
    Ok(())
}
