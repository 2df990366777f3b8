//! The path resolver: walks an absolute path through the directory tree,
//! one validated component at a time.

use crate::device::BlockDevice;
use crate::dirent;
use crate::error::{Errno, Result};
use crate::inode;
use crate::layout::{MAX_NAME, MAX_PATH, ROOT_INODE};

/// The outcome of resolving an absolute path.
///
/// `parent` is the inode of the last directory walked through (the root
/// itself for a bare `/` or a single-component path). `child` is the inode
/// the final component names, or `None` if the final component does not
/// exist in `parent`. `last_name` is the final path component, empty for
/// the bare root path.
pub struct Resolution {
    pub parent: u32,
    pub child: Option<u32>,
    pub last_name: String,
}

/// Validates a single path component: non-empty, at most `MAX_NAME - 1`
/// bytes, and composed only of ASCII letters, digits, `.`, `-` and `_`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME - 1 {
        return Err(Errno::General);
    }
    let valid = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'));
    if !valid {
        return Err(Errno::General);
    }
    Ok(())
}

/// Resolves an absolute path, starting from the root and walking one
/// validated component at a time.
///
/// Fails if `path` does not start with `/`, if any component fails name
/// validation, or if a component names an entry that is itself missing
/// (the previous component resolved to "not found" and the walk tries to
/// descend through it anyway).
pub fn resolve(dev: &mut dyn BlockDevice, path: &str) -> Result<Resolution> {
    if !path.starts_with('/') || path.len() > MAX_PATH - 1 {
        return Err(Errno::General);
    }

    let mut parent = ROOT_INODE;
    let mut child = Some(ROOT_INODE);
    let mut last_name = String::new();

    for token in path.split('/').filter(|s| !s.is_empty()) {
        validate_name(token)?;
        let current = child.ok_or(Errno::General)?;
        parent = current;
        let parent_inode = inode::read_inode(dev, parent)?;
        child = dirent::find_child(dev, &parent_inode, token)?;
        last_name = token.to_string();
    }

    Ok(Resolution {
        parent,
        child,
        last_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BlockDevice, FileBlockDevice};
    use crate::format;

    fn booted_device() -> (FileBlockDevice, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut dev = FileBlockDevice::default();
        dev.init().unwrap();
        dev.save(file.path()).unwrap();
        format::format(&mut dev).unwrap();
        (dev, file)
    }

    #[test]
    fn rejects_relative_paths() {
        let (mut dev, _file) = booted_device();
        assert_eq!(resolve(&mut dev, "a/b").unwrap_err(), Errno::General);
    }

    #[test]
    fn root_path_resolves_to_self() {
        let (mut dev, _file) = booted_device();
        let res = resolve(&mut dev, "/").unwrap();
        assert_eq!(res.parent, ROOT_INODE);
        assert_eq!(res.child, Some(ROOT_INODE));
        assert_eq!(res.last_name, "");
    }

    #[test]
    fn missing_top_level_entry_resolves_with_no_child() {
        let (mut dev, _file) = booted_device();
        let res = resolve(&mut dev, "/missing").unwrap();
        assert_eq!(res.parent, ROOT_INODE);
        assert_eq!(res.child, None);
        assert_eq!(res.last_name, "missing");
    }

    #[test]
    fn missing_intermediate_directory_is_an_error() {
        let (mut dev, _file) = booted_device();
        assert_eq!(
            resolve(&mut dev, "/missing/x").unwrap_err(),
            Errno::General
        );
    }

    #[test]
    fn overlong_path_is_rejected() {
        let (mut dev, _file) = booted_device();
        let long = format!("/{}", "a".repeat(MAX_PATH));
        assert_eq!(resolve(&mut dev, &long).unwrap_err(), Errno::General);
    }

    #[test]
    fn name_validation_rejects_illegal_bytes_and_overlong_names() {
        assert!(validate_name("a.b-c_1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("has/slash").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME)).is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME - 1)).is_ok());
    }
}
