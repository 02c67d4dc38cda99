//! Filesystem adapter.
//!
//! Every filesystem touch made by the store goes through [`FileSystem`], so
//! each failure comes back as an [`FsError`] naming the operation and path.
//! [`OsFileSystem`] is the production implementation over `std::fs`.

pub mod tree;
pub mod walker;

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Filesystem operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    CreateDir,
    ReadDir,
    ReadFile,
    WriteFile,
    CopyFile,
    RemoveFile,
    RemoveDir,
    Rename,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            FsOp::CreateDir => "create-dir",
            FsOp::ReadDir => "read-dir",
            FsOp::ReadFile => "read-file",
            FsOp::WriteFile => "write-file",
            FsOp::CopyFile => "copy-file",
            FsOp::RemoveFile => "remove-file",
            FsOp::RemoveDir => "remove-dir",
            FsOp::Rename => "rename",
        };
        f.write_str(op)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{op} failed on {}: {source}", path.display())]
pub struct FsError {
    pub op: FsOp,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FsError {
    pub fn new(op: FsOp, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;

/// Kind of a directory entry, as reported without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub file_name: OsString,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// File name as UTF-8, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        self.file_name.to_str()
    }
}

pub trait FileSystem: Send + Sync + 'static {
    fn exists(&self, path: &Path) -> bool;

    /// True when `path` resolves (following symlinks) to a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a single directory; fails if it already exists.
    fn create_dir(&self, path: &Path) -> FsResult<()>;

    fn create_dir_all(&self, path: &Path) -> FsResult<()>;

    /// Immediate children of `path`, sorted by file name.
    fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    fn read_to_string(&self, path: &Path) -> FsResult<String>;

    /// Write `contents` to `path`, truncating. With `sync` the data is
    /// flushed to stable storage before returning.
    fn write(&self, path: &Path, contents: &[u8], sync: bool) -> FsResult<()>;

    /// Copy a regular file, returning the number of bytes copied.
    fn copy_file(&self, from: &Path, to: &Path) -> FsResult<u64>;

    fn remove_file(&self, path: &Path) -> FsResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &Path) -> FsResult<()>;

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;
}

/// [`FileSystem`] backed by the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir(&self, path: &Path) -> FsResult<()> {
        fs::create_dir(path).map_err(|e| FsError::new(FsOp::CreateDir, path, e))
    }

    fn create_dir_all(&self, path: &Path) -> FsResult<()> {
        fs::create_dir_all(path).map_err(|e| FsError::new(FsOp::CreateDir, path, e))
    }

    fn read_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let map_err = |e| FsError::new(FsOp::ReadDir, path, e);
        let mut entries = Vec::new();

        for entry in fs::read_dir(path).map_err(map_err)? {
            let entry = entry.map_err(map_err)?;
            let file_type = entry.file_type().map_err(map_err)?;
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                path: entry.path(),
                file_name: entry.file_name(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    fn read_to_string(&self, path: &Path) -> FsResult<String> {
        fs::read_to_string(path).map_err(|e| FsError::new(FsOp::ReadFile, path, e))
    }

    fn write(&self, path: &Path, contents: &[u8], sync: bool) -> FsResult<()> {
        let map_err = |e| FsError::new(FsOp::WriteFile, path, e);
        let mut file = fs::File::create(path).map_err(map_err)?;
        file.write_all(contents).map_err(map_err)?;
        if sync {
            file.sync_all().map_err(map_err)?;
        }
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> FsResult<u64> {
        fs::copy(from, to).map_err(|e| FsError::new(FsOp::CopyFile, from, e))
    }

    fn remove_file(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(|e| FsError::new(FsOp::RemoveFile, path, e))
    }

    fn remove_dir(&self, path: &Path) -> FsResult<()> {
        fs::remove_dir(path).map_err(|e| FsError::new(FsOp::RemoveDir, path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        fs::rename(from, to).map_err(|e| FsError::new(FsOp::Rename, from, e))
    }
}
