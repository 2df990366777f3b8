//! The process-wide open-file table and byte-level read/write/seek on top of
//! an inode's direct sector list.

use crate::device::BlockDevice;
use crate::error::{Errno, Result};
use crate::inode;
use crate::layout::{SECTOR_BITMAP_SECTORS, SECTOR_BITMAP_START, SECTOR_SIZE, TOTAL_SECTORS};
use crate::{bitmap, layout::MAX_OPEN_FILES};

/// A single slot of the open-file table. `inode <= 0` marks the slot free;
/// inode 0 is the root directory and is never opened as a file, so it
/// doubles as the "unused" sentinel.
#[derive(Clone, Copy)]
pub struct OpenFileEntry {
    pub inode: i32,
    pub size: i32,
    pub pos: i32,
}

impl OpenFileEntry {
    const fn free() -> Self {
        Self {
            inode: 0,
            size: 0,
            pos: 0,
        }
    }

    fn is_used(&self) -> bool {
        self.inode > 0
    }
}

/// A freshly booted, fully unused open-file table.
pub fn new_table() -> [OpenFileEntry; MAX_OPEN_FILES] {
    [OpenFileEntry::free(); MAX_OPEN_FILES]
}

fn entry_mut(table: &mut [OpenFileEntry; MAX_OPEN_FILES], fd: usize) -> Result<&mut OpenFileEntry> {
    let entry = table.get_mut(fd).ok_or(Errno::BadFd)?;
    if !entry.is_used() {
        return Err(Errno::BadFd);
    }
    Ok(entry)
}

/// Returns whether `inode` is referenced by any open-file table entry.
pub fn is_open(table: &[OpenFileEntry; MAX_OPEN_FILES], target_inode: u32) -> bool {
    table
        .iter()
        .any(|e| e.is_used() && e.inode as u32 == target_inode)
}

/// Allocates the first free slot for `inode`, caching its current `size`.
pub fn alloc(
    table: &mut [OpenFileEntry; MAX_OPEN_FILES],
    target_inode: u32,
    size: u32,
) -> Result<usize> {
    let slot = table
        .iter()
        .position(|e| !e.is_used())
        .ok_or(Errno::TooManyOpenFiles)?;
    table[slot] = OpenFileEntry {
        inode: target_inode as i32,
        size: size as i32,
        pos: 0,
    };
    Ok(slot)
}

/// Clears a descriptor's slot.
pub fn close(table: &mut [OpenFileEntry; MAX_OPEN_FILES], fd: usize) -> Result<()> {
    let entry = entry_mut(table, fd)?;
    *entry = OpenFileEntry::free();
    Ok(())
}

/// Repositions `fd`'s cursor, rejecting offsets outside `[0, size]`.
pub fn seek(table: &mut [OpenFileEntry; MAX_OPEN_FILES], fd: usize, offset: i64) -> Result<()> {
    let entry = entry_mut(table, fd)?;
    if offset < 0 || offset > entry.size as i64 {
        return Err(Errno::SeekOutOfBounds);
    }
    entry.pos = offset as i32;
    Ok(())
}

/// Reads up to `buf.len()` bytes starting at `fd`'s current position,
/// stopping at end-of-file. Advances `pos` by the number of bytes read.
pub fn read(
    dev: &mut dyn BlockDevice,
    table: &mut [OpenFileEntry; MAX_OPEN_FILES],
    fd: usize,
    buf: &mut [u8],
) -> Result<usize> {
    let entry = *entry_mut(table, fd)?;
    let file_inode = inode::read_inode(dev, entry.inode as u32)?;

    let pos = entry.pos as usize;
    let eof_bound = (entry.size as usize).saturating_sub(pos);
    let n = buf.len().min(eof_bound);

    let mut count = 0usize;
    let mut g = pos / SECTOR_SIZE;
    let mut b = pos % SECTOR_SIZE;
    while count < n {
        let Some(&sector) = file_inode.data.get(g) else {
            break;
        };
        if sector == 0 {
            break;
        }
        let mut sbuf = [0u8; SECTOR_SIZE];
        dev.read_sector(sector as usize, &mut sbuf)?;
        let take = (SECTOR_SIZE - b).min(n - count);
        buf[count..count + take].copy_from_slice(&sbuf[b..b + take]);
        count += take;
        g += 1;
        b = 0;
    }

    let entry = entry_mut(table, fd)?;
    entry.pos += count as i32;
    Ok(count)
}

/// Writes `buf` at `fd`'s current position, growing the file and allocating
/// data sectors as needed. Reuses an already-linked `data[g]` sector in
/// place on overwrite rather than allocating a fresh one, so an overwrite
/// never leaks the sector it replaces.
pub fn write(
    dev: &mut dyn BlockDevice,
    table: &mut [OpenFileEntry; MAX_OPEN_FILES],
    fd: usize,
    buf: &[u8],
) -> Result<usize> {
    let entry = *entry_mut(table, fd)?;
    let file_inode_num = entry.inode as u32;
    let (mut ibuf, mut file_inode) = inode::load_inode(dev, file_inode_num)?;

    let n = buf.len();
    let mut count = 0usize;
    let mut pos = entry.pos as usize;
    let mut g = pos / SECTOR_SIZE;
    let mut b = pos % SECTOR_SIZE;

    let result = loop {
        if count == n {
            break Ok(());
        }
        if g >= file_inode.data.len() {
            break Err(Errno::FileTooBig);
        }

        let mut sbuf = [0u8; SECTOR_SIZE];
        let sector = if file_inode.data[g] != 0 {
            let s = file_inode.data[g] as usize;
            dev.read_sector(s, &mut sbuf)?;
            s
        } else {
            let bit = bitmap::first_unused(
                dev,
                SECTOR_BITMAP_START,
                SECTOR_BITMAP_SECTORS,
                TOTAL_SECTORS,
            )?;
            if bit < 0 {
                break Err(Errno::NoSpace);
            }
            file_inode.data[g] = bit as i32;
            bit as usize
        };

        let take = (SECTOR_SIZE - b).min(n - count);
        sbuf[b..b + take].copy_from_slice(&buf[count..count + take]);
        if let Err(e) = dev.write_sector(sector, &sbuf) {
            break Err(e.into());
        }

        count += take;
        pos += take;
        g += 1;
        b = 0;
    };

    // Persist whatever got written even on failure, so a sector allocated
    // above stays linked into the inode instead of leaking.
    file_inode.size = file_inode.size.max(pos as i32);
    inode::store_inode(dev, file_inode_num, &mut ibuf, &file_inode)?;

    let entry = entry_mut(table, fd)?;
    entry.size = file_inode.size;
    entry.pos = pos as i32;

    result.map(|()| count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FileBlockDevice;
    use crate::format;
    use crate::inode::FileType;

    fn booted_device_with_file() -> (FileBlockDevice, tempfile::NamedTempFile, u32) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut dev = FileBlockDevice::default();
        dev.init().unwrap();
        dev.save(file.path()).unwrap();
        format::format(&mut dev).unwrap();

        let bit = bitmap::first_unused(
            &mut dev,
            crate::layout::INODE_BITMAP_START,
            crate::layout::INODE_BITMAP_SECTORS,
            crate::layout::MAX_FILES,
        )
        .unwrap();
        let new_inode = inode::Inode::new(FileType::File);
        let (mut buf, _) = inode::load_inode(&mut dev, bit as u32).unwrap();
        inode::store_inode(&mut dev, bit as u32, &mut buf, &new_inode).unwrap();
        (dev, file, bit as u32)
    }

    #[test]
    fn write_then_read_round_trips_within_one_open() {
        let (mut dev, _file, inode_num) = booted_device_with_file();
        let mut table = new_table();
        let fd = alloc(&mut table, inode_num, 0).unwrap();

        let written = write(&mut dev, &mut table, fd, b"hello").unwrap();
        assert_eq!(written, 5);
        assert_eq!(table[fd].size, 5);

        seek(&mut table, fd, 0).unwrap();
        let mut out = [0u8; 5];
        let read_count = read(&mut dev, &mut table, fd, &mut out).unwrap();
        assert_eq!(read_count, 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn seek_rejects_out_of_bounds_offsets() {
        let (mut dev, _file, inode_num) = booted_device_with_file();
        let mut table = new_table();
        let fd = alloc(&mut table, inode_num, 0).unwrap();
        write(&mut dev, &mut table, fd, b"hello").unwrap();

        assert_eq!(seek(&mut table, fd, 6).unwrap_err(), Errno::SeekOutOfBounds);
        assert_eq!(seek(&mut table, fd, -1).unwrap_err(), Errno::SeekOutOfBounds);
        assert!(seek(&mut table, fd, 5).is_ok());
    }

    #[test]
    fn overwrite_reuses_existing_sector_without_leaking() {
        let (mut dev, _file, inode_num) = booted_device_with_file();
        let mut table = new_table();
        let fd = alloc(&mut table, inode_num, 0).unwrap();
        write(&mut dev, &mut table, fd, b"hello").unwrap();

        let first_sector = inode::read_inode(&mut dev, inode_num).unwrap().data[0];

        seek(&mut table, fd, 0).unwrap();
        write(&mut dev, &mut table, fd, b"world").unwrap();
        let second_sector = inode::read_inode(&mut dev, inode_num).unwrap().data[0];

        assert_eq!(first_sector, second_sector);
        assert_ne!(first_sector, 0);
    }

    #[test]
    fn bad_fd_is_rejected() {
        let mut table = new_table();
        assert_eq!(close(&mut table, 0).unwrap_err(), Errno::BadFd);
        assert_eq!(close(&mut table, MAX_OPEN_FILES).unwrap_err(), Errno::BadFd);
    }
}
