//! The index document and its recovery scan.
//!
//! `keeper.json` is the source of truth whenever it exists and parses. When
//! it is missing or corrupt the index is rebuilt from the manifests found in
//! the snapshot directories and written back immediately.

use super::codec::{dir_name, read_manifest, snapshot_dir, write_manifest};
use super::naming::with_suffix;
use super::record::{sort_newest_first, Backup, Preferences, StoreDocument};
use crate::fs::{DirEntry, FileSystem, FsError};
use crate::utils::errors::{KeeperError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_INDEX_FILE: &str = "keeper.json";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write index: {0}")]
    Write(FsError),

    #[error("failed to scan store root: {0}")]
    Scan(FsError),
}

/// Outcome of a recovery scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Recovered records, newest first.
    pub backups: Vec<Backup>,
    /// Directories without a usable manifest, duplicating an id, or that
    /// could not be moved to their derived name.
    pub skipped: Vec<PathBuf>,
}

pub struct IndexStore {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    path: PathBuf,
    tmp_path: PathBuf,
    sync_writes: bool,
}

impl IndexStore {
    pub fn new(fs: Arc<dyn FileSystem>, root: &Path, file_name: &str, sync_writes: bool) -> Self {
        Self {
            fs,
            root: root.to_path_buf(),
            path: root.join(file_name),
            tmp_path: root.join(format!("{}.tmp", file_name)),
            sync_writes,
        }
    }

    /// Read the index document.
    ///
    /// `Ok(None)` means there is no document yet; `IndexCorrupt` means one
    /// exists but cannot be trusted. Either way the caller should rebuild.
    pub fn load(&self) -> Result<Option<StoreDocument>> {
        let content = match self.fs.read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(KeeperError::IndexCorrupt(e.to_string())),
        };

        let mut doc: StoreDocument = serde_json::from_str(&content)
            .map_err(|e| KeeperError::IndexCorrupt(e.to_string()))?;

        let mut seen = HashSet::new();
        if let Some(dup) = doc.backups.iter().find(|b| !seen.insert(b.id)) {
            return Err(KeeperError::IndexCorrupt(format!("duplicate backup id {}", dup.id)));
        }

        doc.sort();
        debug!(path = %self.path.display(), backups = doc.backups.len(), "Loaded index");
        Ok(Some(doc))
    }

    /// Preferences from a document that failed to load, if its top level
    /// still parses; defaults otherwise.
    pub fn salvage_preferences(&self) -> Preferences {
        self.fs
            .read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str::<Preferences>(&content).ok())
            .unwrap_or_default()
    }

    /// Overwrite the index document.
    ///
    /// Written to a sibling temp file first and renamed into place, so a
    /// crash leaves either the previous or the new document.
    pub fn save(&self, doc: &StoreDocument) -> std::result::Result<(), IndexError> {
        let json = serde_json::to_vec_pretty(doc)?;
        self.fs
            .write(&self.tmp_path, &json, self.sync_writes)
            .map_err(IndexError::Write)?;
        self.fs
            .rename(&self.tmp_path, &self.path)
            .map_err(IndexError::Write)?;

        debug!(path = %self.path.display(), backups = doc.backups.len(), "Saved index");
        Ok(())
    }

    /// Immediate subdirectories of the store root.
    pub fn snapshot_dirs(&self) -> std::result::Result<Vec<DirEntry>, FsError> {
        Ok(self
            .fs
            .read_dir(&self.root)?
            .into_iter()
            .filter(DirEntry::is_dir)
            .collect())
    }

    /// Collect the records of every snapshot directory holding a valid manifest.
    ///
    /// A directory whose name no longer matches its manifest (an interrupted
    /// rename) is moved to the derived name; if that fails it is skipped.
    pub fn scan(&self) -> std::result::Result<ScanReport, FsError> {
        let mut report = ScanReport::default();
        let mut seen = HashSet::new();

        for entry in self.snapshot_dirs()? {
            let backup = match read_manifest(&*self.fs, &entry.path) {
                Ok(backup) => backup,
                Err(e) => {
                    warn!(dir = %entry.path.display(), error = %e, "Skipping directory without usable manifest");
                    report.skipped.push(entry.path);
                    continue;
                }
            };

            if !seen.insert(backup.id) {
                warn!(dir = %entry.path.display(), id = %backup.id, "Skipping directory with duplicate backup id");
                report.skipped.push(entry.path);
                continue;
            }

            let expected = dir_name(&backup);
            if entry.name() != Some(expected.as_str()) {
                let target = self.root.join(&expected);
                if let Err(e) = self.fs.rename(&entry.path, &target) {
                    warn!(dir = %entry.path.display(), error = %e, "Cannot realign snapshot directory, skipping");
                    report.skipped.push(entry.path);
                    continue;
                }
                info!(from = %entry.path.display(), to = %target.display(), "Realigned snapshot directory");
            }

            report.backups.push(backup);
        }

        sort_newest_first(&mut report.backups);
        report.backups = self.dedupe_names(report.backups, &mut report.skipped);
        Ok(report)
    }

    /// Give every record sharing a name with a newer one the smallest free
    /// ` (n)` suffix, moving its directory and rewriting its manifest.
    ///
    /// `backups` must be newest first and sit at their derived directories.
    fn dedupe_names(&self, backups: Vec<Backup>, skipped: &mut Vec<PathBuf>) -> Vec<Backup> {
        let mut taken: HashSet<String> = backups.iter().map(|b| b.name.clone()).collect();
        let mut kept_names = HashSet::new();
        let mut kept = Vec::with_capacity(backups.len());

        for backup in backups {
            if kept_names.insert(backup.name.clone()) {
                kept.push(backup);
                continue;
            }

            let mut renamed = backup.clone();
            renamed.name = with_suffix(&backup.name, |candidate| taken.contains(candidate));

            let from = snapshot_dir(&self.root, &backup);
            let to = snapshot_dir(&self.root, &renamed);
            if let Err(e) = self.fs.rename(&from, &to) {
                warn!(dir = %from.display(), error = %e, "Cannot rename snapshot with duplicate name, skipping");
                skipped.push(from);
                continue;
            }
            if let Err(e) = write_manifest(&*self.fs, &to, &renamed, self.sync_writes) {
                warn!(dir = %to.display(), error = %e, "Cannot rewrite manifest of renamed snapshot, skipping");
                if let Err(e) = self.fs.rename(&to, &from) {
                    warn!(dir = %to.display(), error = %e, "Could not move snapshot directory back");
                }
                skipped.push(from);
                continue;
            }

            info!(id = %renamed.id, from = %backup.name, to = %renamed.name, "Renamed snapshot sharing a name with a newer one");
            taken.insert(renamed.name.clone());
            kept_names.insert(renamed.name.clone());
            kept.push(renamed);
        }

        kept
    }

    /// Rebuild the index from a scan and persist it.
    pub fn rebuild_from_scan(&self, preferences: Preferences) -> Result<StoreDocument> {
        let report = self.scan().map_err(IndexError::Scan)?;
        let doc = StoreDocument {
            backups: report.backups,
            preferences,
        };
        self.save(&doc)?;

        info!(
            backups = doc.backups.len(),
            skipped = report.skipped.len(),
            "Rebuilt index from snapshot directories"
        );
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OsFileSystem;
    use crate::store::codec::{snapshot_dir, write_manifest, MANIFEST_FILE};
    use crate::store::record::{GameType, Theme};
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn index(root: &Path) -> IndexStore {
        IndexStore::new(Arc::new(OsFileSystem), root, DEFAULT_INDEX_FILE, false)
    }

    fn backup(name: &str, hour: u32) -> Backup {
        Backup {
            id: Uuid::new_v4(),
            name: name.into(),
            game: GameType::EldenRing,
            description: String::new(),
            last_update: Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap(),
        }
    }

    fn plant(root: &Path, backup: &Backup) -> PathBuf {
        let dir = snapshot_dir(root, backup);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("ER0000.sl2"), backup.name.as_bytes()).unwrap();
        write_manifest(&OsFileSystem, &dir, backup, false).unwrap();
        dir
    }

    #[test]
    fn test_load_missing_is_none() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(index(temp_dir.path()).load().unwrap().is_none());
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = index(temp_dir.path());
        let mut doc = StoreDocument::default();
        doc.backups = vec![backup("newer", 10), backup("older", 8)];
        doc.preferences.theme = Theme::Dark;

        store.save(&doc).unwrap();

        assert!(!temp_dir.path().join("keeper.json.tmp").exists());
        assert_eq!(store.load().unwrap().unwrap(), doc);
        Ok(())
    }

    #[test]
    fn test_load_invalid_json_is_corrupt() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(DEFAULT_INDEX_FILE), b"[not json")?;

        assert!(matches!(
            index(temp_dir.path()).load(),
            Err(KeeperError::IndexCorrupt(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_duplicate_ids_is_corrupt() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let store = index(temp_dir.path());
        let b = backup("twice", 1);
        let doc = StoreDocument {
            backups: vec![b.clone(), b],
            preferences: Preferences::default(),
        };
        store.save(&doc).unwrap();

        assert!(matches!(store.load(), Err(KeeperError::IndexCorrupt(_))));
        Ok(())
    }

    #[test]
    fn test_salvage_preferences_from_broken_backups() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(
            temp_dir.path().join(DEFAULT_INDEX_FILE),
            br#"{"backups":[{"id":"nope"}],"fontSize":20,"theme":"dark","lang":"zh"}"#,
        )?;

        let store = index(temp_dir.path());
        assert!(matches!(store.load(), Err(KeeperError::IndexCorrupt(_))));

        let preferences = store.salvage_preferences();
        assert_eq!(preferences.font_size, 20);
        assert_eq!(preferences.theme, Theme::Dark);

        fs::write(temp_dir.path().join(DEFAULT_INDEX_FILE), b"garbage")?;
        assert_eq!(store.salvage_preferences(), Preferences::default());
        Ok(())
    }

    #[test]
    fn test_scan_skips_directories_without_manifest() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let a = backup("first", 9);
        let b = backup("second", 11);
        plant(root, &a);
        plant(root, &b);

        fs::create_dir(root.join("partial-copy"))?;
        fs::write(root.join("partial-copy/ER0000.sl2"), b"half")?;
        let broken = root.join("EldenRing@broken@00000000-0000-0000-0000-000000000000");
        fs::create_dir(&broken)?;
        fs::write(broken.join(MANIFEST_FILE), b"{")?;

        let report = index(root).scan().unwrap();

        let names: Vec<_> = report.backups.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(report.skipped.len(), 2);
        Ok(())
    }

    #[test]
    fn test_scan_realigns_renamed_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let mut b = backup("old name", 9);
        let dir = plant(root, &b);

        // Manifest rewritten but directory still carries the old name.
        b.name = "new name".into();
        write_manifest(&OsFileSystem, &dir, &b, false).unwrap();

        let report = index(root).scan().unwrap();
        assert_eq!(report.backups, vec![b.clone()]);
        assert!(!dir.exists());
        assert!(snapshot_dir(root, &b).join("ER0000.sl2").exists());
        Ok(())
    }

    #[test]
    fn test_scan_renames_older_records_sharing_a_name() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let newest = backup("boss run", 11);
        let older = backup("boss run", 9);
        let holder = backup("boss run (2)", 7);
        plant(root, &newest);
        let older_dir = plant(root, &older);
        plant(root, &holder);

        let report = index(root).scan().unwrap();

        let names: Vec<_> = report.backups.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["boss run", "boss run (3)", "boss run (2)"]);
        assert!(report.skipped.is_empty());

        let renamed = &report.backups[1];
        assert_eq!(renamed.id, older.id);
        assert!(!older_dir.exists());
        let dir = snapshot_dir(root, renamed);
        assert_eq!(read_manifest(&OsFileSystem, &dir).unwrap(), *renamed);
        assert_eq!(fs::read(dir.join("ER0000.sl2"))?, b"boss run");
        Ok(())
    }

    #[test]
    fn test_rebuild_persists_recovered_list() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        let a = backup("alpha", 7);
        plant(root, &a);
        fs::write(root.join(DEFAULT_INDEX_FILE), b"garbage")?;

        let store = index(root);
        let doc = store.rebuild_from_scan(Preferences::default()).unwrap();

        assert_eq!(doc.backups, vec![a]);
        assert_eq!(store.load().unwrap().unwrap(), doc);
        Ok(())
    }
}
