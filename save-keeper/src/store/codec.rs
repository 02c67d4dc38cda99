//! Snapshot directory naming and the per-snapshot manifest.
//!
//! A snapshot lives in `<root>/<type>@<name>@<id>/` and carries a copy of its
//! own record in [`MANIFEST_FILE`], which is what the recovery scan reads.

use super::record::Backup;
use crate::fs::{FileSystem, FsError, FsOp};
use std::path::{Path, PathBuf};

/// Manifest file name inside every snapshot directory.
pub const MANIFEST_FILE: &str = ".keeper-manifest.json";

const SEPARATOR: char = '@';

/// Directory name for a snapshot, derived from `(type, name, id)`.
pub fn dir_name(backup: &Backup) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        backup.game,
        backup.name,
        backup.id,
        sep = SEPARATOR
    )
}

pub fn snapshot_dir(root: &Path, backup: &Backup) -> PathBuf {
    root.join(dir_name(backup))
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no manifest in {}", .0.display())]
    Missing(PathBuf),

    #[error(transparent)]
    Read(FsError),

    #[error("malformed manifest {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn read_manifest(fs: &dyn FileSystem, dir: &Path) -> Result<Backup, ManifestError> {
    let path = dir.join(MANIFEST_FILE);
    let content = fs.read_to_string(&path).map_err(|e| {
        if e.is_not_found() {
            ManifestError::Missing(dir.to_path_buf())
        } else {
            ManifestError::Read(e)
        }
    })?;

    serde_json::from_str(&content).map_err(|source| ManifestError::Malformed { path, source })
}

pub fn write_manifest(
    fs: &dyn FileSystem,
    dir: &Path,
    backup: &Backup,
    sync: bool,
) -> Result<(), FsError> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(backup)
        .map_err(|e| FsError::new(FsOp::WriteFile, &path, e.into()))?;
    fs.write(&path, &json, sync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFileSystem;
    use crate::store::record::GameType;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sample() -> Backup {
        Backup {
            id: Uuid::new_v4(),
            name: "Pontiff@cleared".into(),
            game: GameType::DarkSoulsIII,
            description: "before Aldrich".into(),
            last_update: Utc::now(),
        }
    }

    #[test]
    fn test_dir_name_is_deterministic() {
        let backup = sample();
        let name = dir_name(&backup);

        assert_eq!(name, dir_name(&backup.clone()));
        assert_eq!(name, format!("DarkSoulsIII@Pontiff@cleared@{}", backup.id));
    }

    #[test]
    fn test_dir_name_changes_with_name() {
        let backup = sample();
        let mut renamed = backup.clone();
        renamed.name = "Aldrich down".into();
        assert_ne!(dir_name(&backup), dir_name(&renamed));
    }

    #[test]
    fn test_manifest_roundtrip() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let backup = sample();

        write_manifest(&OsFileSystem, temp_dir.path(), &backup, false).unwrap();
        let read = read_manifest(&OsFileSystem, temp_dir.path()).unwrap();
        assert_eq!(read, backup);

        Ok(())
    }

    #[test]
    fn test_manifest_missing_and_malformed() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        assert!(matches!(
            read_manifest(&OsFileSystem, temp_dir.path()),
            Err(ManifestError::Missing(_))
        ));

        fs::write(temp_dir.path().join(MANIFEST_FILE), b"{ not json")?;
        assert!(matches!(
            read_manifest(&OsFileSystem, temp_dir.path()),
            Err(ManifestError::Malformed { .. })
        ));

        Ok(())
    }
}
