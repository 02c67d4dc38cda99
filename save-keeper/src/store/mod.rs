//! Backup store: snapshot lifecycle on top of the index and the filesystem.
//!
//! Every operation takes the store lock for its whole duration, so at most
//! one operation mutates the index or a snapshot directory at a time. The
//! blocking filesystem work runs on tokio's blocking pool.
//!
//! The lock is per process. Two processes pointed at the same store root
//! are not coordinated and must not be run together.

pub mod codec;
pub mod index;
pub mod naming;
pub mod record;


pub use record::{
    Backup, BackupPatch, GameType, Lang, NewBackup, Preferences, PreferencesPatch, StoreDocument,
    Theme,
};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::fs::tree::{clear_dir, copy_tree, remove_tree, TreeError, TreeOp};
use crate::fs::walker::{summarize, TreeSummary, WalkOptions};
use crate::fs::{FileSystem, FsError, FsOp, OsFileSystem};
use crate::utils::errors::{KeeperError, Result};
use chrono::Utc;
use codec::{dir_name, snapshot_dir, write_manifest, MANIFEST_FILE};
use index::{IndexError, IndexStore};
use record::{MAX_FONT_SIZE, MIN_FONT_SIZE};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Snapshot directories and records that disagree with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    /// Directories under the store root that no indexed record points at.
    pub untracked: Vec<PathBuf>,
    /// Indexed records whose snapshot directory is missing.
    pub dangling: Vec<Uuid>,
}

impl OrphanReport {
    pub fn is_empty(&self) -> bool {
        self.untracked.is_empty() && self.dangling.is_empty()
    }
}

/// Shared handle to an opened store.
#[derive(Clone)]
pub struct BackupStore {
    config: Arc<Config>,
    inner: Arc<Mutex<Keeper>>,
}

impl BackupStore {
    /// Open the store on the host filesystem.
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with(config, Arc::new(OsFileSystem), Arc::new(SystemClock)).await
    }

    /// Open the store, recovering the index from the snapshot directories
    /// when it is missing or corrupt.
    pub async fn open_with(
        config: Config,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let keeper_config = Arc::clone(&config);

        let keeper = tokio::task::spawn_blocking(move || Keeper::open(keeper_config, fs, clock))
            .await
            .map_err(|e| KeeperError::Task(e.to_string()))??;

        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(keeper)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.store.root
    }

    /// Live save directory backed up for `game`.
    pub fn live_dir(&self, game: GameType) -> PathBuf {
        self.config.games.live_dir(game)
    }

    /// All backups, newest first. Served from memory.
    pub async fn list(&self) -> Vec<Backup> {
        self.inner.lock().await.doc.backups.clone()
    }

    pub async fn get(&self, id: Uuid) -> Result<Backup> {
        self.inner
            .lock()
            .await
            .doc
            .find(id)
            .cloned()
            .ok_or(KeeperError::NotFound(id))
    }

    /// Snapshot the live directory of the requested game.
    pub async fn create(&self, request: NewBackup) -> Result<Backup> {
        self.run(move |keeper| keeper.create(request)).await
    }

    /// Replace the live directory with the contents of backup `id`.
    ///
    /// Destructive: the current live contents are deleted first. Callers are
    /// expected to have confirmed this with the user.
    pub async fn load(&self, id: Uuid) -> Result<Backup> {
        self.run(move |keeper| keeper.restore(id)).await
    }

    pub async fn rename(&self, id: Uuid, patch: BackupPatch) -> Result<Backup> {
        self.run(move |keeper| keeper.rename(id, patch)).await
    }

    pub async fn remove(&self, id: Uuid) -> Result<Backup> {
        self.run(move |keeper| keeper.remove(id)).await
    }

    /// Files and bytes held by a snapshot, manifest excluded.
    pub async fn usage(&self, id: Uuid) -> Result<TreeSummary> {
        self.run(move |keeper| keeper.usage(id)).await
    }

    pub async fn orphans(&self) -> Result<OrphanReport> {
        self.run(|keeper| keeper.orphans()).await
    }

    /// Delete every untracked directory under the store root.
    pub async fn sweep_orphans(&self) -> Result<Vec<PathBuf>> {
        self.run(|keeper| keeper.sweep_orphans()).await
    }

    pub async fn preferences(&self) -> Preferences {
        self.inner.lock().await.doc.preferences
    }

    pub async fn set_preferences(&self, patch: PreferencesPatch) -> Result<Preferences> {
        self.run(move |keeper| keeper.set_preferences(patch)).await
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Keeper) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut keeper = Arc::clone(&self.inner).lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut keeper))
            .await
            .map_err(|e| KeeperError::Task(e.to_string()))?
    }
}

struct Keeper {
    config: Arc<Config>,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    index: IndexStore,
    doc: StoreDocument,
}

impl Keeper {
    fn open(config: Arc<Config>, fs: Arc<dyn FileSystem>, clock: Arc<dyn Clock>) -> Result<Self> {
        let root = config.store.root.clone();
        fs.create_dir_all(&root)
            .map_err(|e| KeeperError::StoreUnavailable(IndexError::Scan(e)))?;

        let index = IndexStore::new(
            Arc::clone(&fs),
            &root,
            &config.store.index_file,
            config.index.sync_writes,
        );

        let doc = match index.load() {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                info!(root = %root.display(), "No index document, scanning snapshot directories");
                index.rebuild_from_scan(Preferences::default())?
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Rebuilding index from snapshot directories");
                index.rebuild_from_scan(index.salvage_preferences())?
            }
        };

        info!(root = %root.display(), backups = doc.backups.len(), "Opened backup store");

        let mut keeper = Self {
            config,
            fs,
            clock,
            index,
            doc,
        };

        if keeper.config.recovery.sweep_orphans {
            keeper.sweep_orphans()?;
        } else if keeper.config.recovery.report_orphans {
            let report = keeper.orphans()?;
            for dir in &report.untracked {
                warn!(dir = %dir.display(), "Untracked directory in store root");
            }
            for id in &report.dangling {
                warn!(id = %id, "Indexed backup has no snapshot directory");
            }
        }

        Ok(keeper)
    }

    fn sync_writes(&self) -> bool {
        self.config.index.sync_writes
    }

    fn snapshot_dir(&self, backup: &Backup) -> PathBuf {
        snapshot_dir(&self.config.store.root, backup)
    }

    fn name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.doc
            .backups
            .iter()
            .any(|b| b.name == name && Some(b.id) != except)
    }

    fn persist(&self, doc: &StoreDocument) -> Result<()> {
        self.index.save(doc)?;
        Ok(())
    }

    fn create(&mut self, request: NewBackup) -> Result<Backup> {
        let now = self.clock.now();

        let name = match request.name {
            Some(name) => {
                naming::validate_name(&name)?;
                if self.name_taken(&name, None) {
                    return Err(KeeperError::DuplicateName(name));
                }
                name
            }
            None => naming::resolve_quick_name(
                naming::quick_name(&now),
                self.config.naming.quick_name_collision,
                |candidate| self.name_taken(candidate, None),
            )?,
        };

        let backup = Backup {
            id: Uuid::new_v4(),
            name,
            game: request.game.unwrap_or_default(),
            description: request
                .description
                .unwrap_or_else(|| naming::default_description(&now)),
            last_update: now.with_timezone(&Utc),
        };

        let id = backup.id;
        let live = self.config.games.live_dir(backup.game);
        let dir = self.snapshot_dir(&backup);
        let copy_failed = |source: TreeError| KeeperError::CopyFailed { id, source };

        if !self.fs.is_dir(&live) {
            let missing = io::Error::new(io::ErrorKind::NotFound, "live directory does not exist");
            return Err(copy_failed(TreeError::new(
                TreeOp::Copy,
                &live,
                0,
                FsError::new(FsOp::ReadDir, &live, missing),
            )));
        }

        self.fs
            .create_dir(&dir)
            .map_err(|e| copy_failed(TreeError::new(TreeOp::Copy, &live, 0, e)))?;

        let summary = copy_tree(&*self.fs, &live, &dir, &[MANIFEST_FILE]).map_err(|e| {
            warn!(id = %id, dir = %dir.display(), error = %e, "Copy failed, partial snapshot directory left in place");
            copy_failed(e)
        })?;

        write_manifest(&*self.fs, &dir, &backup, self.sync_writes()).map_err(|e| {
            warn!(id = %id, dir = %dir.display(), error = %e, "Manifest write failed, snapshot directory left in place");
            copy_failed(TreeError::new(TreeOp::Copy, &live, summary.files, e))
        })?;

        let mut next = self.doc.clone();
        next.backups.insert(0, backup.clone());
        if let Err(e) = self.persist(&next) {
            // The recovery scan would adopt a complete snapshot, so it must
            // not outlive the failed create.
            if let Err(cleanup) = remove_tree(&*self.fs, &dir) {
                warn!(id = %id, dir = %dir.display(), error = %cleanup, "Could not remove unindexed snapshot directory");
            }
            return Err(e);
        }
        self.doc = next;

        info!(
            id = %backup.id,
            name = %backup.name,
            game = %backup.game,
            files = summary.files,
            bytes = summary.bytes,
            "Created backup"
        );
        Ok(backup)
    }

    fn restore(&mut self, id: Uuid) -> Result<Backup> {
        let backup = self.doc.find(id).cloned().ok_or(KeeperError::NotFound(id))?;
        let live = self.config.games.live_dir(backup.game);
        let snapshot = self.snapshot_dir(&backup);
        let restore_failed = |live_cleared: bool, source: TreeError| KeeperError::RestoreFailed {
            id,
            live_cleared,
            source,
        };

        if !self.fs.is_dir(&snapshot) {
            let missing = io::Error::new(io::ErrorKind::NotFound, "snapshot directory does not exist");
            return Err(restore_failed(
                false,
                TreeError::new(
                    TreeOp::Copy,
                    &snapshot,
                    0,
                    FsError::new(FsOp::ReadDir, &snapshot, missing),
                ),
            ));
        }

        // Clear in place: the live directory may be a symlink into the game's
        // own save folder, and the link has to survive.
        clear_dir(&*self.fs, &live).map_err(|e| {
            error!(id = %id, live = %live.display(), error = %e, "Clearing live directory failed");
            restore_failed(e.completed > 0, e)
        })?;

        self.fs
            .create_dir_all(&live)
            .map_err(|e| restore_failed(true, TreeError::new(TreeOp::Copy, &snapshot, 0, e)))?;

        let summary = copy_tree(&*self.fs, &snapshot, &live, &[MANIFEST_FILE]).map_err(|e| {
            error!(id = %id, live = %live.display(), error = %e, "Restore copy failed, live directory is incomplete");
            restore_failed(true, e)
        })?;

        info!(
            id = %backup.id,
            name = %backup.name,
            game = %backup.game,
            files = summary.files,
            bytes = summary.bytes,
            "Restored backup"
        );
        Ok(backup)
    }

    fn rename(&mut self, id: Uuid, patch: BackupPatch) -> Result<Backup> {
        let pos = self.doc.position(id).ok_or(KeeperError::NotFound(id))?;

        if let Some(name) = &patch.name {
            naming::validate_name(name)?;
            if self.name_taken(name, Some(id)) {
                return Err(KeeperError::DuplicateName(name.clone()));
            }
        }

        let current = self.doc.backups[pos].clone();
        let mut updated = current.clone();
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(description) = patch.description {
            updated.description = description;
        }
        updated.last_update = self.clock.now().with_timezone(&Utc);

        let from = self.snapshot_dir(&current);
        let to = self.snapshot_dir(&updated);
        let moved = from != to;

        if moved {
            self.fs
                .rename(&from, &to)
                .map_err(|source| KeeperError::RenameFailed { id, source })?;
        }

        if let Err(source) = write_manifest(&*self.fs, &to, &updated, self.sync_writes()) {
            if moved {
                if let Err(e) = self.fs.rename(&to, &from) {
                    error!(id = %id, error = %e, "Could not move snapshot directory back after failed manifest write");
                }
            }
            return Err(KeeperError::RenameFailed { id, source });
        }

        let mut next = self.doc.clone();
        next.backups[pos] = updated.clone();
        next.sort();

        if let Err(e) = self.persist(&next) {
            self.undo_rename(&current, &to, &from);
            return Err(e);
        }
        self.doc = next;

        info!(
            id = %id,
            from = %current.name,
            to = %updated.name,
            "Updated backup"
        );
        Ok(updated)
    }

    /// Best effort: put the directory and manifest of `original` back.
    fn undo_rename(&self, original: &Backup, to: &Path, from: &Path) {
        if to != from {
            if let Err(e) = self.fs.rename(to, from) {
                error!(id = %original.id, error = %e, "Could not move snapshot directory back after failed index write");
                return;
            }
        }
        if let Err(e) = write_manifest(&*self.fs, from, original, self.sync_writes()) {
            error!(id = %original.id, error = %e, "Could not restore manifest after failed index write");
        }
    }

    fn remove(&mut self, id: Uuid) -> Result<Backup> {
        let pos = self.doc.position(id).ok_or(KeeperError::NotFound(id))?;

        let mut next = self.doc.clone();
        let backup = next.backups.remove(pos);
        self.persist(&next)?;
        self.doc = next;

        let dir = self.snapshot_dir(&backup);
        remove_tree(&*self.fs, &dir).map_err(|source| {
            warn!(id = %id, dir = %dir.display(), error = %source, "Backup unindexed but directory removal failed");
            KeeperError::DeleteFailed { id, source }
        })?;

        info!(id = %id, name = %backup.name, game = %backup.game, "Removed backup");
        Ok(backup)
    }

    fn usage(&self, id: Uuid) -> Result<TreeSummary> {
        let backup = self.doc.find(id).ok_or(KeeperError::NotFound(id))?;
        let summary = summarize(
            &self.snapshot_dir(backup),
            WalkOptions::excluding(&[MANIFEST_FILE]),
        )?;
        Ok(summary)
    }

    fn orphans(&self) -> Result<OrphanReport> {
        let entries = self
            .index
            .snapshot_dirs()
            .map_err(|e| KeeperError::StoreUnavailable(IndexError::Scan(e)))?;

        let expected: HashSet<String> = self.doc.backups.iter().map(dir_name).collect();
        let mut present = HashSet::new();
        let mut report = OrphanReport::default();

        for entry in entries {
            match entry.name().map(str::to_string) {
                Some(name) if expected.contains(&name) => {
                    present.insert(name);
                }
                _ => report.untracked.push(entry.path),
            }
        }

        report.dangling = self
            .doc
            .backups
            .iter()
            .filter(|b| !present.contains(&dir_name(b)))
            .map(|b| b.id)
            .collect();

        Ok(report)
    }

    fn sweep_orphans(&mut self) -> Result<Vec<PathBuf>> {
        let report = self.orphans()?;
        let mut removed = Vec::with_capacity(report.untracked.len());

        for dir in report.untracked {
            remove_tree(&*self.fs, &dir).map_err(|source| KeeperError::SweepFailed {
                removed: removed.len(),
                source,
            })?;
            info!(dir = %dir.display(), "Removed untracked directory");
            removed.push(dir);
        }

        Ok(removed)
    }

    fn set_preferences(&mut self, patch: PreferencesPatch) -> Result<Preferences> {
        let mut preferences = self.doc.preferences;

        if let Some(size) = patch.font_size {
            if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&size) {
                return Err(KeeperError::InvalidPreferences(format!(
                    "font size must be between {} and {}, got {}",
                    MIN_FONT_SIZE, MAX_FONT_SIZE, size
                )));
            }
            preferences.font_size = size;
        }
        if let Some(theme) = patch.theme {
            preferences.theme = theme;
        }
        if let Some(lang) = patch.lang {
            preferences.lang = lang;
        }

        let mut next = self.doc.clone();
        next.preferences = preferences;
        self.persist(&next)?;
        self.doc = next;

        Ok(preferences)
    }
}
