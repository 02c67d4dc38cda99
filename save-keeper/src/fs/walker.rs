//! Read-only directory traversal.
//!
//! Used to size snapshots and to compare trees; mutation goes through
//! [`super::tree`] and the [`super::FileSystem`] adapter instead.

use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// File names ignored directly under the root
    pub exclude_top_level: Vec<String>,
}

impl WalkOptions {
    pub fn excluding(names: &[&str]) -> Self {
        Self {
            exclude_top_level: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Symlinks are resolved; directory targets and broken links yield None.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let size = if entry.path_is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if !resolved.is_dir() => resolved.len(),
                _ => return Ok(None),
            }
        } else {
            entry.metadata()?.len()
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
        }))
    }
}

/// File count and byte total of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub files: usize,
    pub bytes: u64,
}

/// Walk a directory tree and collect all files, sorted by relative path.
pub fn walk_directory(root: &Path, options: WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();
    walk_directory_with_callback(root, options, |file| files.push(file.clone()))?;
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Walk a directory tree with a callback for each file
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(&FileInfo),
{
    let mut it = WalkDir::new(root).into_iter();
    while let Some(entry) = it.next() {
        let entry = entry?;

        if should_exclude(&entry, &options.exclude_top_level) {
            if entry.file_type().is_dir() {
                it.skip_current_dir();
            }
            continue;
        }

        if entry.file_type().is_dir() {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            callback(&file_info);
        }
    }

    Ok(())
}

/// Count files and bytes below `root`.
pub fn summarize(root: &Path, options: WalkOptions) -> std::io::Result<TreeSummary> {
    let mut summary = TreeSummary::default();

    walk_directory_with_callback(root, options, |file| {
        summary.files += 1;
        summary.bytes += file.size;
    })?;

    Ok(summary)
}

fn should_exclude(entry: &DirEntry, names: &[String]) -> bool {
    entry.depth() == 1 && names.iter().any(|n| entry.file_name() == n.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, Path::new("file1.txt"));
        assert_eq!(files[1].relative_path, Path::new("subdir/file2.txt"));

        Ok(())
    }

    #[test]
    fn test_summarize() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::write(temp_dir.path().join("file1.txt"), b"12345")?;     // 5 bytes
        fs::write(temp_dir.path().join("file2.txt"), b"1234567")?;   // 7 bytes

        let summary = summarize(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(summary, TreeSummary { files: 2, bytes: 12 });

        Ok(())
    }

    #[test]
    fn test_exclude_top_level_only() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("nested"))?;
        fs::write(temp_dir.path().join("save.sl2"), b"keep")?;
        fs::write(temp_dir.path().join(".manifest"), b"exclude")?;
        fs::write(temp_dir.path().join("nested/.manifest"), b"keep")?;

        let files = walk_directory(temp_dir.path(), WalkOptions::excluding(&[".manifest"]))?;
        let names: Vec<_> = files.iter().map(|f| f.relative_path.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("nested/.manifest"), PathBuf::from("save.sl2")]);

        Ok(())
    }
}
