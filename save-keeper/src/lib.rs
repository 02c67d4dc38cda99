//! Save Keeper Library
//!
//! Snapshot store for game save-data directories: create, restore, rename
//! and delete named copies of a live save folder, with an index that can be
//! rebuilt from the snapshots themselves.

pub mod clock;
pub mod config;
pub mod fs;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use store::{
    Backup, BackupPatch, BackupStore, GameType, NewBackup, OrphanReport, Preferences,
    PreferencesPatch,
};
pub use utils::errors::{ErrorKind, KeeperError};
pub type Result<T> = std::result::Result<T, KeeperError>;
