//! Whole-tree copy and removal.
//!
//! Both walks keep an explicit stack instead of recursing, and the first
//! entry-level failure aborts the walk. The returned [`TreeError`] reports
//! how many entries were completed before the abort so callers can describe
//! the partial state left behind.

use super::walker::TreeSummary;
use super::{EntryKind, FileSystem, FsError};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    Copy,
    Remove,
}

impl fmt::Display for TreeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeOp::Copy => f.write_str("copy"),
            TreeOp::Remove => f.write_str("remove"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{op} of {} aborted after {completed} entries: {source}", root.display())]
pub struct TreeError {
    pub op: TreeOp,
    pub root: PathBuf,
    /// Entries (files and directories) fully processed before the failure.
    pub completed: usize,
    #[source]
    pub source: FsError,
}

impl TreeError {
    pub fn new(op: TreeOp, root: impl Into<PathBuf>, completed: usize, source: FsError) -> Self {
        Self {
            op,
            root: root.into(),
            completed,
            source,
        }
    }
}

/// Copy the contents of `from` into `to`, creating `to` if needed.
///
/// Top-level entries of `from` whose names appear in `skip_top_level` are
/// not copied. Symlinks to files are copied as regular files; symlinks to
/// directories and dangling symlinks are skipped.
pub fn copy_tree(
    fs: &dyn FileSystem,
    from: &Path,
    to: &Path,
    skip_top_level: &[&str],
) -> Result<TreeSummary, TreeError> {
    let mut summary = TreeSummary::default();
    let mut completed = 0usize;
    let abort = |completed: usize, e: FsError| TreeError::new(TreeOp::Copy, from, completed, e);

    fs.create_dir_all(to).map_err(|e| abort(completed, e))?;

    let mut stack: Vec<(PathBuf, PathBuf, usize)> = vec![(from.to_path_buf(), to.to_path_buf(), 0)];

    while let Some((src_dir, dst_dir, depth)) = stack.pop() {
        let entries = fs.read_dir(&src_dir).map_err(|e| abort(completed, e))?;

        for entry in entries {
            if depth == 0 {
                if let Some(name) = entry.name() {
                    if skip_top_level.contains(&name) {
                        continue;
                    }
                }
            }

            let target = dst_dir.join(&entry.file_name);
            match entry.kind {
                EntryKind::Dir => {
                    fs.create_dir(&target).map_err(|e| abort(completed, e))?;
                    stack.push((entry.path, target, depth + 1));
                }
                EntryKind::Symlink if !fs.exists(&entry.path) || fs.is_dir(&entry.path) => {
                    warn!(path = %entry.path.display(), "Skipping symlink to directory or dangling symlink");
                    continue;
                }
                EntryKind::File | EntryKind::Symlink => {
                    let bytes = fs
                        .copy_file(&entry.path, &target)
                        .map_err(|e| abort(completed, e))?;
                    summary.files += 1;
                    summary.bytes += bytes;
                }
            }
            completed += 1;
        }
    }

    debug!(
        from = %from.display(),
        to = %to.display(),
        files = summary.files,
        bytes = summary.bytes,
        "Copied tree"
    );
    Ok(summary)
}

/// Remove `root` and everything below it. A missing `root` is not an error.
///
/// Returns the number of entries removed, `root` included.
pub fn remove_tree(fs: &dyn FileSystem, root: &Path) -> Result<usize, TreeError> {
    if !fs.exists(root) {
        return Ok(0);
    }

    let mut completed = 0usize;
    let abort = |completed: usize, e: FsError| TreeError::new(TreeOp::Remove, root, completed, e);

    // (dir, children_done): a directory is pushed back with `true` before
    // its children so it is only removed once they are gone.
    let mut stack: Vec<(PathBuf, bool)> = vec![(root.to_path_buf(), false)];

    while let Some((dir, children_done)) = stack.pop() {
        if children_done {
            fs.remove_dir(&dir).map_err(|e| abort(completed, e))?;
            completed += 1;
            continue;
        }

        stack.push((dir.clone(), true));
        for entry in fs.read_dir(&dir).map_err(|e| abort(completed, e))? {
            if entry.is_dir() {
                stack.push((entry.path, false));
            } else {
                fs.remove_file(&entry.path).map_err(|e| abort(completed, e))?;
                completed += 1;
            }
        }
    }

    debug!(root = %root.display(), entries = completed, "Removed tree");
    Ok(completed)
}

/// Remove everything below `root` and keep `root` itself.
///
/// When `root` is a symlink to a directory the link stays and the target is
/// emptied. Returns the number of entries removed; a missing `root` is `Ok(0)`.
pub fn clear_dir(fs: &dyn FileSystem, root: &Path) -> Result<usize, TreeError> {
    if !fs.exists(root) {
        return Ok(0);
    }

    let mut completed = 0usize;
    let entries = fs
        .read_dir(root)
        .map_err(|e| TreeError::new(TreeOp::Remove, root, 0, e))?;

    for entry in entries {
        if entry.is_dir() {
            let removed = remove_tree(fs, &entry.path).map_err(|e| {
                TreeError::new(TreeOp::Remove, root, completed + e.completed, e.source)
            })?;
            completed += removed;
        } else {
            fs.remove_file(&entry.path)
                .map_err(|e| TreeError::new(TreeOp::Remove, root, completed, e))?;
            completed += 1;
        }
    }

    debug!(root = %root.display(), entries = completed, "Cleared directory");
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testing::FaultyFs;
    use crate::fs::{FsOp, OsFileSystem};
    use std::fs;
    use tempfile::TempDir;

    fn populate(root: &Path) -> std::io::Result<()> {
        fs::create_dir_all(root.join("profile/slot1"))?;
        fs::write(root.join("DS30000.sl2"), b"main save")?;
        fs::write(root.join("profile/settings.ini"), b"[video]")?;
        fs::write(root.join("profile/slot1/data.bin"), vec![7u8; 2048])?;
        fs::create_dir(root.join("empty"))?;
        Ok(())
    }

    #[test]
    fn test_copy_tree_reproduces_structure() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        populate(&src)?;

        let summary = copy_tree(&OsFileSystem, &src, &dst, &[]).unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.bytes, 9 + 7 + 2048);
        assert_eq!(fs::read(dst.join("DS30000.sl2"))?, b"main save");
        assert_eq!(fs::read(dst.join("profile/slot1/data.bin"))?, vec![7u8; 2048]);
        assert!(dst.join("empty").is_dir());

        Ok(())
    }

    #[test]
    fn test_copy_tree_skips_top_level_names_only() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(src.join("nested"))?;
        fs::write(src.join("skip.json"), b"top")?;
        fs::write(src.join("nested/skip.json"), b"deep")?;

        copy_tree(&OsFileSystem, &src, &dst, &["skip.json"]).unwrap();

        assert!(!dst.join("skip.json").exists());
        assert!(dst.join("nested/skip.json").exists());

        Ok(())
    }

    #[test]
    fn test_copy_tree_missing_source_fails_without_progress() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let err = copy_tree(
            &OsFileSystem,
            &temp_dir.path().join("missing"),
            &temp_dir.path().join("dst"),
            &[],
        )
        .unwrap_err();

        assert_eq!(err.op, TreeOp::Copy);
        assert_eq!(err.completed, 0);
        assert!(err.source.is_not_found());

        Ok(())
    }

    #[test]
    fn test_copy_tree_aborts_on_first_failure() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        populate(&src)?;

        let faulty = FaultyFs::new();
        faulty.fail(FsOp::CopyFile, "settings.ini", 0);

        let err = copy_tree(&faulty, &src, &dst, &[]).unwrap_err();
        assert_eq!(err.source.op, FsOp::CopyFile);
        assert!(err.completed > 0);
        // Entries after the failing file were never attempted.
        assert!(!dst.join("profile/slot1/data.bin").exists());

        Ok(())
    }

    #[test]
    fn test_remove_tree_removes_everything() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("live");
        populate(&root)?;

        let removed = remove_tree(&OsFileSystem, &root).unwrap();

        // 3 files + profile, slot1, empty + root
        assert_eq!(removed, 7);
        assert!(!root.exists());

        Ok(())
    }

    #[test]
    fn test_remove_tree_missing_root_is_noop() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        assert_eq!(remove_tree(&OsFileSystem, &temp_dir.path().join("nope")).unwrap(), 0);
        Ok(())
    }

    #[test]
    fn test_remove_tree_reports_partial_state() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("live");
        populate(&root)?;

        let faulty = FaultyFs::new();
        faulty.fail(FsOp::RemoveFile, "data.bin", 0);

        let err = remove_tree(&faulty, &root).unwrap_err();
        assert_eq!(err.op, TreeOp::Remove);
        assert_eq!(err.source.op, FsOp::RemoveFile);
        assert!(root.join("profile/slot1/data.bin").exists());

        Ok(())
    }

    #[test]
    fn test_clear_dir_keeps_root() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("live");
        populate(&root)?;

        let removed = clear_dir(&OsFileSystem, &root).unwrap();

        assert_eq!(removed, 6);
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root)?.count(), 0);
        assert_eq!(clear_dir(&OsFileSystem, &temp_dir.path().join("nope")).unwrap(), 0);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_clear_dir_through_symlink_keeps_link() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let target = temp_dir.path().join("real");
        let link = temp_dir.path().join("live");
        populate(&target)?;
        std::os::unix::fs::symlink(&target, &link)?;

        clear_dir(&OsFileSystem, &link).unwrap();

        assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target)?.count(), 0);

        Ok(())
    }
}
