//! `mkfs`: formats a backing file as a `tinyfs` image, or verifies that one
//! already in place is valid. Not an interactive shell: it performs the
//! boot-or-format operation described by the library and exits.

use std::env;
use std::path::PathBuf;
use std::process::exit;
use tinyfs::FileSystem;

fn usage(bin: &str) -> ! {
    eprintln!("usage: {bin} <path>");
    exit(1);
}

fn error(bin: &str, msg: impl std::fmt::Display) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

fn main() {
    let mut args = env::args_os();
    let bin = args
        .next()
        .map(PathBuf::from)
        .and_then(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .unwrap_or_else(|| "mkfs".to_string());

    let mut path = None;
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => usage(&bin),
            _ => path = Some(PathBuf::from(arg)),
        }
    }
    let path = path.unwrap_or_else(|| usage(&bin));

    match FileSystem::boot(&path) {
        Ok(mut fs) => {
            if let Err(e) = fs.sync() {
                error(&bin, e);
            }
            println!("{}: formatted", path.display());
        }
        Err(e) => error(&bin, format_args!("{}: {e}", path.display())),
    }
}
