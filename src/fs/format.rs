//! Formatting a fresh backing file: superblock, both bitmaps, inode table and
//! the root directory inode.

use crate::bitmap;
use crate::device::BlockDevice;
use crate::error::Result;
use crate::inode::{FileType, Inode};
use crate::layout::{
    DATA_REGION_START, INODE_BITMAP_SECTORS, INODE_BITMAP_START, INODE_TABLE_SECTORS,
    INODE_TABLE_START, MAGIC, ROOT_INODE, SECTOR_BITMAP_SECTORS, SECTOR_BITMAP_START, SECTOR_SIZE,
};

/// Writes a brand new, empty filesystem image to `dev`: the superblock
/// magic, an inode bitmap with only the root reserved, a sector bitmap with
/// the first four regions reserved, a zeroed inode table, and inode 0
/// initialized as the (empty) root directory.
pub fn format(dev: &mut dyn BlockDevice) -> Result<()> {
    let mut superblock = [0u8; SECTOR_SIZE];
    superblock[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    dev.write_sector(0, &superblock)?;

    // Only inode 0 (the root) is reserved at format time.
    bitmap::init(dev, INODE_BITMAP_START, INODE_BITMAP_SECTORS, 1)?;
    // Sectors 0..DATA_REGION_START belong to the superblock and the three
    // metadata regions; everything from DATA_REGION_START on is free.
    bitmap::init(
        dev,
        SECTOR_BITMAP_START,
        SECTOR_BITMAP_SECTORS,
        DATA_REGION_START,
    )?;

    let zero_sector = [0u8; SECTOR_SIZE];
    for s in 0..INODE_TABLE_SECTORS {
        dev.write_sector(INODE_TABLE_START + s, &zero_sector)?;
    }

    let root = Inode::new(FileType::Dir);
    let (sector, offset) = crate::layout::inode_location(ROOT_INODE);
    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_sector(sector, &mut buf)?;
    let src = unsafe {
        std::slice::from_raw_parts(&root as *const _ as *const u8, std::mem::size_of::<Inode>())
    };
    buf[offset..offset + std::mem::size_of::<Inode>()].copy_from_slice(src);
    dev.write_sector(sector, &buf)?;

    Ok(())
}

/// Verifies that a loaded device has a valid superblock magic.
pub fn check_magic(dev: &mut dyn BlockDevice) -> Result<bool> {
    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_sector(0, &mut buf)?;
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    Ok(magic == MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FileBlockDevice;
    use crate::inode;

    #[test]
    fn format_produces_valid_magic_and_empty_root() {
        let mut dev = FileBlockDevice::default();
        dev.init().unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        dev.save(file.path()).unwrap();

        format(&mut dev).unwrap();
        assert!(check_magic(&mut dev).unwrap());

        let root = inode::read_inode(&mut dev, ROOT_INODE).unwrap();
        assert_eq!(root.kind(), Some(FileType::Dir));
        assert_eq!(root.size, 0);
    }
}
