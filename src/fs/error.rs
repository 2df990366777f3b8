//! The process-wide error kinds returned by every fallible filesystem operation.

use std::fmt;
use std::io;

/// The kind of the most recent failed operation.
///
/// Every public [`crate::FileSystem`] method that can fail returns one of these
/// through its `Result`'s `Err` variant, playing the role of the "process errno"
/// described for this system: only the outcome of the most recent operation is
/// ever observable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Errno {
    /// Create conflict, missing parent, or I/O failure while creating an entry.
    Create,
    /// No such file.
    NoSuchFile,
    /// No such directory.
    NoSuchDir,
    /// Attempt to unlink a non-empty directory.
    DirNotEmpty,
    /// Attempt to unlink the root directory.
    RootDir,
    /// The file is currently open.
    FileInUse,
    /// The open-file table is full.
    TooManyOpenFiles,
    /// The descriptor is out of range or not in use.
    BadFd,
    /// The seek target lies outside `[0, size]`.
    SeekOutOfBounds,
    /// Writing the file would exceed `MAX_SECTORS_PER_FILE`.
    FileTooBig,
    /// A bitmap has no free bit left.
    NoSpace,
    /// The caller's buffer is too small to hold a directory's entries.
    BufferTooSmall,
    /// Any other unexpected failure: I/O, bad magic, corrupted inode type.
    General,
}

impl fmt::Display for Errno {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Create => "cannot create entry",
            Self::NoSuchFile => "no such file",
            Self::NoSuchDir => "no such directory",
            Self::DirNotEmpty => "directory not empty",
            Self::RootDir => "operation not permitted on the root directory",
            Self::FileInUse => "file is currently open",
            Self::TooManyOpenFiles => "too many open files",
            Self::BadFd => "bad file descriptor",
            Self::SeekOutOfBounds => "seek target out of bounds",
            Self::FileTooBig => "file too big",
            Self::NoSpace => "no space left on device",
            Self::BufferTooSmall => "buffer too small",
            Self::General => "general filesystem error",
        };
        write!(fmt, "{msg}")
    }
}

impl std::error::Error for Errno {}

impl From<io::Error> for Errno {
    fn from(_: io::Error) -> Self {
        // Lower layers never distinguish I/O failure kinds any further than
        // "this operation failed"; the caller decides the more specific kind
        // where context allows (e.g. `Create` vs `General`).
        Self::General
    }
}

/// Shorthand for the result type returned by the core filesystem operations.
pub type Result<T> = std::result::Result<T, Errno>;
