use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// 副檔名 → 目的資料夾 的對應表，key 一律為小寫且帶前導點 (例如 `.txt`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionMap {
    entries: BTreeMap<String, PathBuf>,
}

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a mapping, normalizing the key to lower case. Returns the previous destination.
    pub fn insert(&mut self, extension: &str, destination: impl Into<PathBuf>) -> Option<PathBuf> {
        self.entries
            .insert(extension.to_lowercase(), destination.into())
    }

    pub fn remove(&mut self, extension: &str) -> Option<PathBuf> {
        self.entries.remove(&extension.to_lowercase())
    }

    pub fn get(&self, extension: &str) -> Option<&Path> {
        self.entries
            .get(&extension.to_lowercase())
            .map(PathBuf::as_path)
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.entries.contains_key(&extension.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(ext, dir)| (ext.as_str(), dir.as_path()))
    }

    /// Copies every mapping of `other` into `self`, overriding existing keys.
    pub fn merge(&mut self, other: ExtensionMap) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: AsRef<str>, P: Into<PathBuf>> FromIterator<(E, P)> for ExtensionMap {
    fn from_iter<I: IntoIterator<Item = (E, P)>>(iter: I) -> Self {
        let mut map = ExtensionMap::new();
        for (ext, dir) in iter {
            map.insert(ext.as_ref(), dir);
        }
        map
    }
}

/// 原始檔案系統事件種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingEventKind {
    Created,
    Modified,
    RenamedInto,
}

impl fmt::Display for PendingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PendingEventKind::Created => "created",
            PendingEventKind::Modified => "modified",
            PendingEventKind::RenamedInto => "renamed-into",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub path: PathBuf,
    pub detected_at: Instant,
    pub kind: PendingEventKind,
}

impl PendingEvent {
    pub fn new(path: impl Into<PathBuf>, kind: PendingEventKind) -> Self {
        Self {
            path: path.into(),
            detected_at: Instant::now(),
            kind,
        }
    }
}

/// Extension Resolver 的輸出，交給 Mover 使用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDecision {
    pub source_path: PathBuf,
    /// Directory the file belongs in; the final name is chosen by the collision resolver.
    pub destination_dir: PathBuf,
    pub extension: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Ok,
    NotConfigured,
    VanishedBeforeSort,
    CollisionExhausted,
    PartialMoveRolledBack,
    PermissionDenied,
    IoError,
    SkippedAtShutdown,
    ShutdownTimeout,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Ok)
    }

    /// Informational outcomes leave the file in place without being an error.
    pub fn is_informational(self) -> bool {
        matches!(
            self,
            Outcome::NotConfigured | Outcome::VanishedBeforeSort | Outcome::SkippedAtShutdown
        )
    }

    pub fn is_failure(self) -> bool {
        !self.is_success() && !self.is_informational()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 每一次排序嘗試的稽核紀錄，建立後不可變更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub source_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<PathBuf>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditRecord {
    pub fn new(
        source_path: impl Into<PathBuf>,
        destination_path: Option<PathBuf>,
        outcome: Outcome,
        reason: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            source_path: source_path.into(),
            destination_path,
            outcome,
            reason,
        }
    }

    pub fn moved(source_path: impl Into<PathBuf>, destination_path: PathBuf) -> Self {
        Self::new(source_path, Some(destination_path), Outcome::Ok, None)
    }

    pub fn skipped(source_path: impl Into<PathBuf>, outcome: Outcome, reason: impl Into<String>) -> Self {
        Self::new(source_path, None, outcome, Some(reason.into()))
    }
}
