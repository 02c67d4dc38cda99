//! Configuration management for the save keeper.
//!
//! Loads configuration from a TOML file; every field has a default so a
//! partial file (or none at all) is valid.

use crate::store::index::DEFAULT_INDEX_FILE;
use crate::store::record::GameType;
use crate::utils::errors::KeeperError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub games: GamesConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the index document and all snapshot directories
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    /// File name of the index document inside `root`
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamesConfig {
    /// Parent of the per-game live save directories (`<data_dir>/<Type>`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Explicit live directory per game type name, overriding `data_dir`
    #[serde(default)]
    pub overrides: BTreeMap<String, PathBuf>,
}

/// What to do when a synthesized quick-backup name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickNamePolicy {
    /// Fail with `DuplicateName`
    Reject,
    /// Append ` (2)`, ` (3)`, ... until unique
    #[default]
    Suffix,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub quick_name_collision: QuickNamePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// fsync index and manifest writes before reporting success
    #[serde(default = "default_true")]
    pub sync_writes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Log untracked snapshot directories when the store opens
    #[serde(default = "default_true")]
    pub report_orphans: bool,

    /// Delete untracked snapshot directories when the store opens
    #[serde(default)]
    pub sweep_orphans: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_data_dir() -> PathBuf {
    std::env::var_os("APPDATA")
        .or_else(|| std::env::var_os("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_store_root() -> PathBuf {
    default_data_dir().join("DarkSoulsKeeper")
}

fn default_index_file() -> String {
    DEFAULT_INDEX_FILE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
            index_file: default_index_file(),
        }
    }
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            overrides: BTreeMap::new(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { sync_writes: true }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            report_orphans: true,
            sweep_orphans: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GamesConfig {
    /// Live save directory for `game`.
    pub fn live_dir(&self, game: GameType) -> PathBuf {
        self.overrides
            .iter()
            .find(|(key, _)| key.parse::<GameType>().ok() == Some(game))
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| self.data_dir.join(game.as_str()))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KeeperError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| KeeperError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted entirely under `base`; handy for tests and portable installs.
    pub fn rooted_at(base: &Path) -> Self {
        Config {
            store: StoreConfig {
                root: base.join("keeper"),
                index_file: default_index_file(),
            },
            games: GamesConfig {
                data_dir: base.join("games"),
                overrides: BTreeMap::new(),
            },
            ..Config::default()
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        let index_file = Path::new(&self.store.index_file);
        if self.store.index_file.is_empty() || index_file.components().count() != 1 {
            return Err(KeeperError::Config(format!(
                "store.index_file must be a plain file name, got {:?}",
                self.store.index_file
            )));
        }

        if let Some(key) = self
            .games
            .overrides
            .keys()
            .find(|key| key.parse::<GameType>().is_err())
        {
            return Err(KeeperError::Config(format!("unknown game type in games.overrides: {}", key)));
        }

        for game in GameType::ALL {
            let live = self.games.live_dir(game);
            if live.starts_with(&self.store.root) || self.store.root.starts_with(&live) {
                return Err(KeeperError::Config(format!(
                    "live directory for {} ({}) overlaps the store root ({})",
                    game,
                    live.display(),
                    self.store.root.display()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_uses_defaults() -> std::io::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            r#"
[store]
root = "/srv/keeper"

[games.overrides]
EldenRing = "/mnt/saves/elden"

[naming]
quick_name_collision = "reject"
"#
        )?;

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.store.root, PathBuf::from("/srv/keeper"));
        assert_eq!(config.store.index_file, "keeper.json");
        assert_eq!(config.naming.quick_name_collision, QuickNamePolicy::Reject);
        assert!(config.index.sync_writes);
        assert!(!config.recovery.sweep_orphans);
        assert_eq!(config.log.level, "info");
        assert_eq!(
            config.games.live_dir(GameType::EldenRing),
            PathBuf::from("/mnt/saves/elden")
        );

        Ok(())
    }

    #[test]
    fn test_live_dir_defaults_to_type_name() {
        let config = Config::rooted_at(Path::new("/base"));
        assert_eq!(
            config.games.live_dir(GameType::Sekiro),
            PathBuf::from("/base/games/Sekiro")
        );
    }

    #[test]
    fn test_rejects_overlapping_live_dir() {
        let mut config = Config::rooted_at(Path::new("/base"));
        config
            .games
            .overrides
            .insert("DarkSouls".into(), PathBuf::from("/base/keeper/ds1"));
        assert!(matches!(config.validate(), Err(KeeperError::Config(_))));
    }

    #[test]
    fn test_rejects_nested_index_file() {
        let mut config = Config::rooted_at(Path::new("/base"));
        config.store.index_file = "nested/keeper.json".into();
        assert!(matches!(config.validate(), Err(KeeperError::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_override_key() {
        let mut config = Config::rooted_at(Path::new("/base"));
        config
            .games
            .overrides
            .insert("Bloodborne".into(), PathBuf::from("/saves/bb"));
        assert!(matches!(config.validate(), Err(KeeperError::Config(_))));
    }

    #[test]
    fn test_unknown_file_is_config_error() {
        let err = Config::from_file(Path::new("/nonexistent_path_12345/keeper.toml")).unwrap_err();
        assert!(matches!(err, KeeperError::Config(_)));
    }
}
