//! Filesystem abstraction so collectors can be tested without /proc.
//!
//! Everything the collectors touch goes through [`FileSystem`]: plain
//! reads, directory listings, symlink resolution (for /proc/<pid>/fd),
//! and statvfs (for mount capacity). Production uses [`RealFs`]; tests
//! use the in-memory mock.

use std::io;
use std::path::{Path, PathBuf};

/// Capacity numbers for one mounted filesystem, as statvfs reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsUsage {
    pub total_bytes: u64,
    /// Bytes available to unprivileged users (f_bavail).
    pub free_bytes: u64,
    pub inodes_total: u64,
    pub inodes_free: u64,
}

/// Abstraction over the filesystem operations collectors need.
pub trait FileSystem: Send + Sync {
    /// Read an entire file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Whether a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// List entries of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Resolve a symlink target without following further.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Filesystem capacity at a mount point.
    fn statvfs(&self, path: &Path) -> io::Result<FsUsage>;
}

/// Real filesystem implementation delegating to std and libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(path)? {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn statvfs(&self, path: &Path) -> io::Result<FsUsage> {
        use std::os::unix::ffi::OsStrExt;

        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // SAFETY: c_path is a valid NUL-terminated string and stat is a
        // properly sized out-parameter.
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        let frsize = if stat.f_frsize > 0 {
            stat.f_frsize as u64
        } else {
            stat.f_bsize as u64
        };
        Ok(FsUsage {
            total_bytes: stat.f_blocks as u64 * frsize,
            free_bytes: stat.f_bavail as u64 * frsize,
            inodes_total: stat.f_files as u64,
            inodes_free: stat.f_favail as u64,
        })
    }
}
