//! Filesystem collaborators for the reference registry
//!
//! The registry never touches the filesystem directly: listing the source root
//! and creating target files go through these traits so tests can substitute
//! in-memory fakes.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

/// Lists regular files directly under a directory (non-recursive)
pub trait DirectoryLister: Send + Sync {
    fn list_regular_files(&self, root: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Creates empty files under a root with a registry-chosen name
pub trait FileAllocator: Send + Sync {
    fn create_empty(&self, root: &Path, generated_name: &str) -> io::Result<PathBuf>;
}

/// Local filesystem implementation of both collaborators
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl DirectoryLister for FsStore {
    fn list_regular_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            // fs::metadata follows symlinks, so a link to a regular file counts
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => files.push(path),
                Ok(_) => trace!("Skipping non-regular entry {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Skipping dangling entry {:?}", path);
                }
                Err(e) => return Err(e),
            }
        }
        files.sort();
        Ok(files)
    }
}

impl FileAllocator for FsStore {
    fn create_empty(&self, root: &Path, generated_name: &str) -> io::Result<PathBuf> {
        let path = root.join(generated_name);
        // create_new refuses to reuse an existing file
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(path)
    }
}

/// Resolve `.` and `..` components without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Make `path` absolute against the current directory, then normalize it
pub fn absolute_normalized(path: &Path) -> io::Result<PathBuf> {
    Ok(normalize_lexically(&std::path::absolute(path)?))
}
