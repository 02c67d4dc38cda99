//! Error types for the save keeper.

use crate::fs::tree::TreeError;
use crate::fs::FsError;
use crate::store::index::IndexError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A backup named \"{0}\" already exists")]
    DuplicateName(String),

    #[error("Backup name \"{name}\" contains the reserved character {ch:?}")]
    IllegalName { name: String, ch: char },

    #[error("Backup name must be between {min} and {max} characters, got {len}")]
    InvalidLength { len: usize, min: usize, max: usize },

    #[error("Backup not found: {0}")]
    NotFound(Uuid),

    #[error("Backup {id} could not be created: {source}")]
    CopyFailed {
        id: Uuid,
        #[source]
        source: TreeError,
    },

    /// `live_cleared` is set when the live directory was already removed
    /// before the failure, i.e. the game currently has no save data.
    #[error("Backup {id} could not be restored (live directory cleared: {live_cleared}): {source}")]
    RestoreFailed {
        id: Uuid,
        live_cleared: bool,
        #[source]
        source: TreeError,
    },

    #[error("Backup {id} could not be renamed: {source}")]
    RenameFailed {
        id: Uuid,
        #[source]
        source: FsError,
    },

    #[error("Backup {id} was removed from the index but its directory remains: {source}")]
    DeleteFailed {
        id: Uuid,
        #[source]
        source: TreeError,
    },

    #[error("Orphan sweep stopped after removing {removed} directories: {source}")]
    SweepFailed {
        removed: usize,
        #[source]
        source: TreeError,
    },

    #[error("Index document is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] IndexError),

    #[error("Invalid preferences: {0}")]
    InvalidPreferences(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Stable, machine-readable classification of a [`KeeperError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    DuplicateName,
    IllegalName,
    InvalidLength,
    NotFound,
    CopyFailed,
    RestoreFailed,
    RenameFailed,
    DeleteFailed,
    IndexCorrupt,
    StoreUnavailable,
    InvalidPreferences,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "Config",
            ErrorKind::DuplicateName => "DuplicateName",
            ErrorKind::IllegalName => "IllegalName",
            ErrorKind::InvalidLength => "InvalidLength",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::CopyFailed => "CopyFailed",
            ErrorKind::RestoreFailed => "RestoreFailed",
            ErrorKind::RenameFailed => "RenameFailed",
            ErrorKind::DeleteFailed => "DeleteFailed",
            ErrorKind::IndexCorrupt => "IndexCorrupt",
            ErrorKind::StoreUnavailable => "StoreUnavailable",
            ErrorKind::InvalidPreferences => "InvalidPreferences",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl KeeperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeeperError::Config(_) => ErrorKind::Config,
            KeeperError::DuplicateName(_) => ErrorKind::DuplicateName,
            KeeperError::IllegalName { .. } => ErrorKind::IllegalName,
            KeeperError::InvalidLength { .. } => ErrorKind::InvalidLength,
            KeeperError::NotFound(_) => ErrorKind::NotFound,
            KeeperError::CopyFailed { .. } => ErrorKind::CopyFailed,
            KeeperError::RestoreFailed { .. } => ErrorKind::RestoreFailed,
            KeeperError::RenameFailed { .. } => ErrorKind::RenameFailed,
            KeeperError::DeleteFailed { .. } | KeeperError::SweepFailed { .. } => {
                ErrorKind::DeleteFailed
            }
            KeeperError::IndexCorrupt(_) => ErrorKind::IndexCorrupt,
            KeeperError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            KeeperError::InvalidPreferences(_) => ErrorKind::InvalidPreferences,
            KeeperError::Io(_) | KeeperError::Serialization(_) | KeeperError::Task(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Validation errors are raised before any filesystem mutation; the
    /// caller can retry with corrected input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DuplicateName | ErrorKind::IllegalName | ErrorKind::InvalidLength
        )
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_kinds() {
        assert!(KeeperError::DuplicateName("x".into()).is_validation());
        assert!(KeeperError::InvalidLength { len: 1, min: 3, max: 36 }.is_validation());
        assert!(!KeeperError::NotFound(Uuid::nil()).is_validation());
    }

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(KeeperError::NotFound(Uuid::nil()).kind().as_str(), "NotFound");
        assert_eq!(
            KeeperError::IllegalName { name: "a/b".into(), ch: '/' }.kind().to_string(),
            "IllegalName"
        );
    }
}
