//! Directory operations: enumerate, search, append, and remove directory
//! entries backed by a directory inode's data sectors.

use crate::bitmap;
use crate::device::BlockDevice;
use crate::error::{Errno, Result};
use crate::inode::{self, FileType, Inode};
use crate::layout::{
    DIRENTS_PER_SECTOR, MAX_NAME, SECTOR_BITMAP_START, SECTOR_BITMAP_SECTORS, SECTOR_SIZE,
    TOTAL_SECTORS,
};
use std::mem::size_of;

/// A single `(name, inode)` pair packed within a directory's data sector.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Dirent {
    pub name: [u8; MAX_NAME],
    pub inode: i32,
}

impl Dirent {
    fn zeroed() -> Self {
        Self {
            name: [0; MAX_NAME],
            inode: 0,
        }
    }

    fn matches_name(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        if bytes.len() >= MAX_NAME {
            return false;
        }
        &self.name[..bytes.len()] == bytes && self.name.get(bytes.len()).copied().unwrap_or(0) == 0
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; MAX_NAME];
        let bytes = name.as_bytes();
        self.name[..bytes.len()].copy_from_slice(bytes);
    }

    /// Returns the entry's name as a `&str`, stopping at the NUL terminator.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

fn entry_offset(e: usize) -> usize {
    (e % DIRENTS_PER_SECTOR) * size_of::<Dirent>()
}

fn read_dirent(buf: &[u8; SECTOR_SIZE], e: usize) -> Dirent {
    let off = entry_offset(e);
    let mut d = Dirent::zeroed();
    let dst = unsafe { std::slice::from_raw_parts_mut(&mut d as *mut _ as *mut u8, size_of::<Dirent>()) };
    dst.copy_from_slice(&buf[off..off + size_of::<Dirent>()]);
    d
}

fn write_dirent(buf: &mut [u8; SECTOR_SIZE], e: usize, d: &Dirent) {
    let off = entry_offset(e);
    let src = unsafe { std::slice::from_raw_parts(d as *const _ as *const u8, size_of::<Dirent>()) };
    buf[off..off + size_of::<Dirent>()].copy_from_slice(src);
}

/// Searches `parent`'s entries for `name`, returning the child's inode number
/// if found.
///
/// Fails with [`Errno::General`] if `parent` is not a directory or a sector
/// read fails; returns `Ok(None)` if no entry matches.
pub fn find_child(dev: &mut dyn BlockDevice, parent: &Inode, name: &str) -> Result<Option<u32>> {
    inode::expect_type(parent, FileType::Dir)?;

    let mut remaining = parent.size as usize;
    let mut g = 0usize;
    while remaining > 0 {
        let sector = parent.data[g];
        if sector == 0 {
            return Err(Errno::General);
        }
        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sector(sector as usize, &mut buf)?;

        let in_group = remaining.min(DIRENTS_PER_SECTOR);
        for e in 0..in_group {
            let entry = read_dirent(&buf, e);
            if entry.matches_name(name) {
                return Ok(Some(entry.inode as u32));
            }
        }

        remaining -= in_group;
        g += 1;
    }
    Ok(None)
}

/// Appends a new `(name, child)` entry to `parent`, growing `parent`'s data
/// sectors through the sector bitmap when the current last sector is full.
///
/// `parent_buf`/`parent` are the sector and view already loaded by the
/// caller for inode `parent_num`; on success they reflect the updated
/// `size` and `data` fields and must still be persisted by the caller.
pub fn append_child(
    dev: &mut dyn BlockDevice,
    parent: &mut Inode,
    name: &str,
    child: u32,
) -> Result<()> {
    inode::expect_type(parent, FileType::Dir)?;

    let size = parent.size as usize;
    let g = size / DIRENTS_PER_SECTOR;
    if g >= parent.data.len() {
        return Err(Errno::FileTooBig);
    }

    let mut buf = [0u8; SECTOR_SIZE];
    if size % DIRENTS_PER_SECTOR == 0 {
        let bit = bitmap::first_unused(
            dev,
            SECTOR_BITMAP_START,
            SECTOR_BITMAP_SECTORS,
            TOTAL_SECTORS,
        )?;
        if bit < 0 {
            return Err(Errno::NoSpace);
        }
        // The bit index returned by the sector bitmap is the absolute sector
        // number (the bitmap covers the whole disk, reserved regions
        // included), so it is used directly as the data sector index.
        parent.data[g] = bit as i32;
    } else {
        let sector = parent.data[g];
        if sector == 0 {
            return Err(Errno::General);
        }
        dev.read_sector(sector as usize, &mut buf)?;
    }

    let mut entry = Dirent::zeroed();
    entry.set_name(name);
    entry.inode = child as i32;
    write_dirent(&mut buf, size % DIRENTS_PER_SECTOR, &entry);
    dev.write_sector(parent.data[g] as usize, &buf)?;

    parent.size += 1;
    Ok(())
}

/// Removes the entry referencing `child` from `parent`'s entries, if present.
///
/// Entries after the removed one keep their slot; `size` shrinks by one but
/// surviving entries do not move, so a later [`append_child`] does not fill
/// the hole left behind (spec'd behavior: the directory is never compacted).
pub fn remove_child(dev: &mut dyn BlockDevice, parent: &mut Inode, child: u32) -> Result<()> {
    inode::expect_type(parent, FileType::Dir)?;

    let mut remaining = parent.size as usize;
    let mut g = 0usize;
    while remaining > 0 {
        let sector = parent.data[g];
        if sector == 0 {
            return Err(Errno::General);
        }
        let mut buf = [0u8; SECTOR_SIZE];
        dev.read_sector(sector as usize, &mut buf)?;

        let in_group = remaining.min(DIRENTS_PER_SECTOR);
        for e in 0..in_group {
            let entry = read_dirent(&buf, e);
            if entry.inode as u32 == child {
                write_dirent(&mut buf, e, &Dirent::zeroed());
                dev.write_sector(sector as usize, &buf)?;
                parent.size = parent.size.saturating_sub(1);
                return Ok(());
            }
        }

        remaining -= in_group;
        g += 1;
    }
    Err(Errno::General)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BlockDevice, FileBlockDevice};

    #[test]
    fn dirent_name_round_trips() {
        let mut d = Dirent::zeroed();
        d.set_name("hello");
        assert_eq!(d.name_str(), "hello");
        assert!(d.matches_name("hello"));
        assert!(!d.matches_name("hell"));
    }

    #[test]
    fn dirent_fits_in_sector_an_integer_number_of_times() {
        assert!(DIRENTS_PER_SECTOR > 0);
        assert!(DIRENTS_PER_SECTOR * size_of::<Dirent>() <= SECTOR_SIZE);
    }

    #[test]
    fn find_child_on_empty_dir_returns_none() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut dev = FileBlockDevice::default();
        dev.init().unwrap();
        dev.save(file.path()).unwrap();

        let dir = Inode::new(FileType::Dir);
        let found = find_child(&mut dev, &dir, "x").unwrap();
        assert_eq!(found, None);
    }
}
