//! The block device adapter: the thin, sector-granular contract the core
//! filesystem logic is built against.
//!
//! This is the "external collaborator" of the design: none of the bitmap,
//! inode, directory, path, namespace or open-file modules touch `std::fs`
//! directly. They only ever go through a [`BlockDevice`], the same way
//! `mkfs`'s `FSFactory` implementations only ever see a `&mut File` handed to
//! them rather than opening paths themselves.

use crate::layout::{SECTOR_SIZE, TOTAL_SECTORS};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A sector-addressable block device of exactly `TOTAL_SECTORS` sectors of
/// `SECTOR_SIZE` bytes each.
pub trait BlockDevice {
    /// Brings the device into a usable, zeroed state with no backing file.
    fn init(&mut self) -> io::Result<()>;

    /// Reads sector `index` into `buf`.
    fn read_sector(&mut self, index: usize, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()>;

    /// Writes `buf` to sector `index`.
    fn write_sector(&mut self, index: usize, buf: &[u8; SECTOR_SIZE]) -> io::Result<()>;

    /// Loads the device's full contents from the file at `path`.
    ///
    /// Fails (amongst other reasons) if the file does not exist.
    fn load(&mut self, path: &Path) -> io::Result<()>;

    /// Flushes the device's full contents to the file at `path`, creating it
    /// if necessary.
    fn save(&mut self, path: &Path) -> io::Result<()>;
}

/// A [`BlockDevice`] backed by a single host file of exactly
/// `SECTOR_SIZE * TOTAL_SECTORS` bytes.
pub struct FileBlockDevice {
    file: Option<File>,
}

impl Default for FileBlockDevice {
    fn default() -> Self {
        Self { file: None }
    }
}

impl FileBlockDevice {
    /// Total size in bytes of a valid backing file.
    pub const IMAGE_SIZE: u64 = (SECTOR_SIZE * TOTAL_SECTORS) as u64;

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device has no backing file"))
    }
}

impl BlockDevice for FileBlockDevice {
    fn init(&mut self) -> io::Result<()> {
        self.file = None;
        Ok(())
    }

    fn read_sector(&mut self, index: usize, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start((index * SECTOR_SIZE) as u64))?;
        file.read_exact(buf)
    }

    fn write_sector(&mut self, index: usize, buf: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start((index * SECTOR_SIZE) as u64))?;
        file.write_all(buf)
    }

    fn load(&mut self, path: &Path) -> io::Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        self.file = Some(file);
        Ok(())
    }

    fn save(&mut self, path: &Path) -> io::Result<()> {
        // The image is written sector-by-sector as it's produced, so `save`
        // only needs to make sure a freshly-formatted device has a backing
        // file of the right size and that every write so far is durable.
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.set_len(Self::IMAGE_SIZE)?;
            self.file = Some(file);
        }
        self.file_mut()?.flush()
    }
}

/// Returns whether the file at `path` exists and has exactly the expected
/// image size, without fully loading it.
pub fn is_valid_image_file(path: &Path) -> io::Result<bool> {
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.is_file() && metadata.len() == FileBlockDevice::IMAGE_SIZE)
}
