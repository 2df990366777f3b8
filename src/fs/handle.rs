//! `FileSystem`: the single handle bundling the block device, the backing
//! path and the open-file table — all of the process-wide state, packed
//! into one struct instead of hidden globals.

use crate::device::{is_valid_image_file, BlockDevice, FileBlockDevice};
use crate::diag::warn;
use crate::dirent::Dirent;
use crate::error::{Errno, Result};
use crate::inode::{self, FileType};
use crate::layout::MAX_OPEN_FILES;
use crate::openfile::{self, OpenFileEntry};
use crate::{format, namespace, path};
use std::io;
use std::mem::size_of;
use std::path::{Path, PathBuf};

/// An open-file descriptor: an index into [`FileSystem`]'s open-file table.
pub type Fd = usize;

/// The filesystem handle: a [`BlockDevice`], the backing file path (for
/// [`FileSystem::sync`]) and the process-wide open-file table.
pub struct FileSystem {
    dev: FileBlockDevice,
    backing_path: PathBuf,
    open_files: [OpenFileEntry; MAX_OPEN_FILES],
}

impl FileSystem {
    /// Brings up a filesystem backed by the host file at `backing_path`.
    ///
    /// If the file does not exist, a fresh image is formatted and written.
    /// If it exists, its size and superblock magic are verified; a
    /// mismatch on either is reported as [`Errno::General`].
    pub fn boot(backing_path: impl AsRef<Path>) -> Result<Self> {
        let backing_path = backing_path.as_ref().to_path_buf();
        let mut dev = FileBlockDevice::default();
        dev.init()?;

        match is_valid_image_file(&backing_path) {
            Ok(true) => {
                dev.load(&backing_path)?;
                if !format::check_magic(&mut dev)? {
                    return Err(Errno::General);
                }
            }
            // The file exists but is the wrong size: a corrupted or
            // foreign file, not something to silently overwrite.
            Ok(false) => return Err(Errno::General),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "{} does not exist, formatting a fresh image",
                    backing_path.display()
                );
                // `save` must run first: it is what creates and sizes the
                // backing file, giving the device something to write
                // sectors into.
                dev.save(&backing_path)?;
                format::format(&mut dev)?;
                dev.save(&backing_path)?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            dev,
            backing_path,
            open_files: openfile::new_table(),
        })
    }

    /// Flushes the in-memory device state to the backing file.
    pub fn sync(&mut self) -> Result<()> {
        self.dev.save(&self.backing_path)?;
        Ok(())
    }

    /// Creates a new regular file at `path`.
    pub fn file_create(&mut self, path: &str) -> Result<()> {
        namespace::create(&mut self.dev, FileType::File, path)
    }

    /// Opens the regular file at `path`, returning a descriptor. The same
    /// file may be opened concurrently by more than one descriptor.
    ///
    /// Only a cleanly resolved `path` whose final component is absent is
    /// reported as [`Errno::NoSuchFile`]; a failure during resolution itself
    /// (invalid name, missing intermediate directory, or a genuine I/O
    /// fault) propagates as [`path::resolve`]'s own [`Errno::General`].
    pub fn file_open(&mut self, path: &str) -> Result<Fd> {
        let res = path::resolve(&mut self.dev, path)?;
        let child = res.child.ok_or(Errno::NoSuchFile)?;
        let target = inode::read_inode(&mut self.dev, child)?;
        inode::expect_type(&target, FileType::File).map_err(|_| Errno::General)?;
        openfile::alloc(&mut self.open_files, child, target.size as u32)
    }

    /// Reads up to `buf.len()` bytes from `fd` at its current position.
    pub fn file_read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        openfile::read(&mut self.dev, &mut self.open_files, fd, buf)
    }

    /// Writes `buf` to `fd` at its current position, growing the file as
    /// needed.
    pub fn file_write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        openfile::write(&mut self.dev, &mut self.open_files, fd, buf)
    }

    /// Repositions `fd`'s cursor to `offset`, which must lie in `[0, size]`.
    pub fn file_seek(&mut self, fd: Fd, offset: i64) -> Result<()> {
        openfile::seek(&mut self.open_files, fd, offset)
    }

    /// Closes `fd`.
    pub fn file_close(&mut self, fd: Fd) -> Result<()> {
        openfile::close(&mut self.open_files, fd)
    }

    /// Unlinks the regular file at `path`. Fails with [`Errno::FileInUse`]
    /// if any descriptor still has it open.
    pub fn file_unlink(&mut self, path: &str) -> Result<()> {
        namespace::unlink(&mut self.dev, &self.open_files, FileType::File, path)
    }

    /// Creates a new, empty directory at `path`.
    pub fn dir_create(&mut self, path: &str) -> Result<()> {
        namespace::create(&mut self.dev, FileType::Dir, path)
    }

    /// Returns the size in bytes a [`Self::dir_read`] buffer for `path`
    /// must be at least, i.e. `entries * size_of::<Dirent>()`.
    pub fn dir_size(&mut self, path: &str) -> Result<usize> {
        let dir = self.resolve_dir(path)?;
        Ok(dir.size as usize * size_of::<Dirent>())
    }

    /// Copies the raw packed array of `path`'s directory entries into
    /// `buf`, in insertion order. `buf` must be at least
    /// [`Self::dir_size`] bytes, else [`Errno::BufferTooSmall`].
    pub fn dir_read(&mut self, path: &str, buf: &mut [u8]) -> Result<()> {
        let dir = self.resolve_dir(path)?;
        let needed = dir.size as usize * size_of::<Dirent>();
        if buf.len() < needed {
            return Err(Errno::BufferTooSmall);
        }

        let mut remaining = dir.size as usize;
        let mut g = 0usize;
        let mut out_off = 0usize;
        while remaining > 0 {
            let sector = dir.data[g];
            let mut sbuf = [0u8; crate::layout::SECTOR_SIZE];
            self.dev.read_sector(sector as usize, &mut sbuf)?;

            let in_group = remaining.min(crate::layout::DIRENTS_PER_SECTOR);
            let bytes = in_group * size_of::<Dirent>();
            buf[out_off..out_off + bytes].copy_from_slice(&sbuf[..bytes]);

            out_off += bytes;
            remaining -= in_group;
            g += 1;
        }
        Ok(())
    }

    /// Unlinks the (empty) directory at `path`. Fails with
    /// [`Errno::DirNotEmpty`] if it still has entries, or
    /// [`Errno::RootDir`] for `/` itself.
    pub fn dir_unlink(&mut self, path: &str) -> Result<()> {
        namespace::unlink(&mut self.dev, &self.open_files, FileType::Dir, path)
    }

    /// Only a cleanly resolved `path` whose final component is absent is
    /// reported as [`Errno::NoSuchDir`]; a failure during resolution itself
    /// (invalid name, missing intermediate directory, or a genuine I/O
    /// fault) propagates as [`path::resolve`]'s own [`Errno::General`].
    fn resolve_dir(&mut self, path: &str) -> Result<inode::Inode> {
        let res = path::resolve(&mut self.dev, path)?;
        let child = res.child.ok_or(Errno::NoSuchDir)?;
        let dir = inode::read_inode(&mut self.dev, child)?;
        inode::expect_type(&dir, FileType::Dir).map_err(|_| Errno::General)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_on_fresh_file_has_empty_root() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let mut fs = FileSystem::boot(file.path()).unwrap();
        assert_eq!(fs.dir_size("/").unwrap(), 0);
    }

    #[test]
    fn create_list_scenario() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let mut fs = FileSystem::boot(file.path()).unwrap();

        fs.file_create("/a").unwrap();
        fs.file_create("/b").unwrap();

        let size = fs.dir_size("/").unwrap();
        assert_eq!(size, 2 * size_of::<Dirent>());
        let mut buf = vec![0u8; size];
        fs.dir_read("/", &mut buf).unwrap();

        let first = unsafe { &*(buf.as_ptr() as *const Dirent) };
        let second = unsafe { &*(buf.as_ptr().add(size_of::<Dirent>()) as *const Dirent) };
        assert_eq!(first.name_str(), "a");
        assert_eq!(second.name_str(), "b");
        assert_ne!(first.inode, 0);
        assert_ne!(second.inode, 0);
        assert_ne!(first.inode, second.inode);
    }

    #[test]
    fn write_read_seek_scenario() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let mut fs = FileSystem::boot(file.path()).unwrap();

        fs.file_create("/x").unwrap();
        let fd = fs.file_open("/x").unwrap();
        fs.file_write(fd, b"hello").unwrap();
        fs.file_seek(fd, 0).unwrap();
        let mut out = [0u8; 5];
        fs.file_read(fd, &mut out).unwrap();
        assert_eq!(&out, b"hello");

        assert_eq!(fs.file_seek(fd, 6).unwrap_err(), Errno::SeekOutOfBounds);
    }

    #[test]
    fn persist_across_sync_and_reboot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let path = file.path().to_path_buf();

        {
            let mut fs = FileSystem::boot(&path).unwrap();
            fs.file_create("/x").unwrap();
            let fd = fs.file_open("/x").unwrap();
            fs.file_write(fd, b"hello").unwrap();
            fs.file_close(fd).unwrap();
            fs.sync().unwrap();
        }

        let mut fs = FileSystem::boot(&path).unwrap();
        let fd = fs.file_open("/x").unwrap();
        let mut out = [0u8; 5];
        fs.file_read(fd, &mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn dir_entries_persist_across_sync_and_reboot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let path = file.path().to_path_buf();

        {
            let mut fs = FileSystem::boot(&path).unwrap();
            fs.file_create("/a").unwrap();
            fs.file_create("/b").unwrap();
            fs.dir_create("/d").unwrap();
            fs.sync().unwrap();
        }

        let mut fs = FileSystem::boot(&path).unwrap();
        let size = fs.dir_size("/").unwrap();
        assert_eq!(size, 3 * size_of::<Dirent>());
        let mut buf = vec![0u8; size];
        fs.dir_read("/", &mut buf).unwrap();

        let first = unsafe { &*(buf.as_ptr() as *const Dirent) };
        let second = unsafe { &*(buf.as_ptr().add(size_of::<Dirent>()) as *const Dirent) };
        let third = unsafe { &*(buf.as_ptr().add(2 * size_of::<Dirent>()) as *const Dirent) };
        assert_eq!(first.name_str(), "a");
        assert_eq!(second.name_str(), "b");
        assert_eq!(third.name_str(), "d");
    }

    #[test]
    fn unlink_busy_then_free() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let mut fs = FileSystem::boot(file.path()).unwrap();

        fs.file_create("/x").unwrap();
        let fd = fs.file_open("/x").unwrap();
        fs.file_write(fd, b"hello").unwrap();

        assert_eq!(fs.file_unlink("/x").unwrap_err(), Errno::FileInUse);
        fs.file_close(fd).unwrap();
        fs.file_unlink("/x").unwrap();
        assert_eq!(fs.file_open("/x").unwrap_err(), Errno::NoSuchFile);
    }

    #[test]
    fn dir_read_rejects_too_small_buffer() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).unwrap();
        let mut fs = FileSystem::boot(file.path()).unwrap();
        fs.file_create("/a").unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(
            fs.dir_read("/", &mut buf).unwrap_err(),
            Errno::BufferTooSmall
        );
    }
}
