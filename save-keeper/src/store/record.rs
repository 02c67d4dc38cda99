//! Snapshot records and the persisted store document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Game whose save directory a backup was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum GameType {
    DarkSouls,
    DarkSoulsII,
    #[default]
    DarkSoulsIII,
    Sekiro,
    EldenRing,
}

impl GameType {
    pub const ALL: [GameType; 5] = [
        GameType::DarkSouls,
        GameType::DarkSoulsII,
        GameType::DarkSoulsIII,
        GameType::Sekiro,
        GameType::EldenRing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::DarkSouls => "DarkSouls",
            GameType::DarkSoulsII => "DarkSoulsII",
            GameType::DarkSoulsIII => "DarkSoulsIII",
            GameType::Sekiro => "Sekiro",
            GameType::EldenRing => "EldenRing",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown game type: {0}")]
pub struct UnknownGameType(pub String);

impl FromStr for GameType {
    type Err = UnknownGameType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameType::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownGameType(s.to_string()))
    }
}

/// A snapshot record, stored both in the index and as the manifest inside
/// the snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub game: GameType,
    pub description: String,
    pub last_update: DateTime<Utc>,
}

/// Input for creating a backup. Omitted fields are synthesized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBackup {
    #[serde(default, rename = "type")]
    pub game: Option<GameType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Metadata changes applied by a rename/update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl BackupPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Zh,
}

pub const MIN_FONT_SIZE: u8 = 12;
pub const MAX_FONT_SIZE: u8 = 24;

/// UI preferences persisted alongside the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub font_size: u8,
    pub theme: Theme,
    pub lang: Lang,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            font_size: 16,
            theme: Theme::System,
            lang: Lang::En,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    #[serde(default)]
    pub font_size: Option<u8>,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub lang: Option<Lang>,
}

/// The index document: every record, newest first, plus preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub backups: Vec<Backup>,
    #[serde(flatten)]
    pub preferences: Preferences,
}

impl StoreDocument {
    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.backups.iter().position(|b| b.id == id)
    }

    pub fn find(&self, id: Uuid) -> Option<&Backup> {
        self.backups.iter().find(|b| b.id == id)
    }

    /// Stable newest-first ordering by `last_update`.
    pub fn sort(&mut self) {
        sort_newest_first(&mut self.backups);
    }
}

pub fn sort_newest_first(backups: &mut [Backup]) {
    backups.sort_by(|a, b| b.last_update.cmp(&a.last_update));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backup_json_shape() {
        let backup = Backup {
            id: Uuid::nil(),
            name: "Before Nameless King".into(),
            game: GameType::DarkSoulsIII,
            description: "Created at 2026-10-19 15:30:00".into(),
            last_update: Utc.with_ymd_and_hms(2026, 10, 19, 13, 30, 0).unwrap(),
        };

        let value = serde_json::to_value(&backup).unwrap();
        assert_eq!(value["type"], "DarkSoulsIII");
        assert_eq!(value["lastUpdate"], "2026-10-19T13:30:00Z");
        assert_eq!(value["name"], "Before Nameless King");
    }

    #[test]
    fn test_document_defaults_missing_preferences() {
        let doc: StoreDocument = serde_json::from_str(r#"{"backups": [], "theme": "dark"}"#).unwrap();
        assert!(doc.backups.is_empty());
        assert_eq!(doc.preferences.theme, Theme::Dark);
        assert_eq!(doc.preferences.font_size, 16);
        assert_eq!(doc.preferences.lang, Lang::En);
    }

    #[test]
    fn test_document_flattens_preferences() {
        let value = serde_json::to_value(StoreDocument::default()).unwrap();
        assert_eq!(value["fontSize"], 16);
        assert_eq!(value["theme"], "system");
        assert_eq!(value["lang"], "en");
        assert!(value["backups"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_game_type_from_str() {
        assert_eq!("EldenRing".parse::<GameType>().unwrap(), GameType::EldenRing);
        assert_eq!("sekiro".parse::<GameType>().unwrap(), GameType::Sekiro);
        assert!("Bloodborne".parse::<GameType>().is_err());
    }

    #[test]
    fn test_sort_is_stable_newest_first() {
        let at = |h| Utc.with_ymd_and_hms(2026, 1, 1, h, 0, 0).unwrap();
        let mk = |name: &str, h| Backup {
            id: Uuid::new_v4(),
            name: name.into(),
            game: GameType::EldenRing,
            description: String::new(),
            last_update: at(h),
        };
        let mut backups = vec![mk("old", 1), mk("tie-a", 5), mk("tie-b", 5), mk("new", 9)];
        sort_newest_first(&mut backups);

        let names: Vec<_> = backups.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["new", "tie-a", "tie-b", "old"]);
    }
}
