//! Per-user "last synchronized" timestamps.
//!
//! Kept in a small JSON file next to the database rather than inside it, so
//! the ledger survives store migrations and `clear()`.

use super::StorageError;
use crate::models::entity::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Which sync path a ledger entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Library,
    Diagrams,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Library => "library",
            LedgerKind::Diagrams => "diagrams",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn entry_key(username: &str, kind: LedgerKind) -> String {
    format!("{}::{}", username, kind.as_str())
}

/// File-backed timestamp ledger.
pub struct TimestampLedger {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl TimestampLedger {
    /// Load the ledger at `path`. A missing or corrupted file reads as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last synchronized instant, `None` when never synced or unreadable.
    pub fn get_last_synced(&self, username: &str, kind: LedgerKind) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let raw = entries.get(&entry_key(username, kind))?;
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            warn!("Ignoring unreadable ledger entry {}: {:?}", entry_key(username, kind), raw);
        }
        parsed
    }

    pub fn set_last_synced(
        &self,
        username: &str,
        kind: LedgerKind,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(entry_key(username, kind), format_timestamp(&at));
        persist(&self.path, &entries)
    }

    /// Forget every entry of `username` (logout).
    pub fn clear_user(&self, username: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let prefix = format!("{}::", username);
        entries.retain(|key, _| !key.starts_with(&prefix));
        persist(&self.path, &entries)
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("Failed to read sync ledger {:?}: {}", path, e);
            return BTreeMap::new();
        }
    };

    // Non-string values are dropped individually rather than discarding the file.
    match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&raw) {
        Ok(map) => map
            .into_iter()
            .filter_map(|(key, value)| value.as_str().map(|v| (key, v.to_string())))
            .collect(),
        Err(e) => {
            warn!("Sync ledger {:?} is corrupted, starting empty: {}", path, e);
            BTreeMap::new()
        }
    }
}

fn persist(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(entries)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Ledger(format!("{:?}: {}", parent, e)))?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| StorageError::Ledger(format!("{:?}: {}", tmp, e)))?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::Ledger(format!("{:?}: {}", path, e)))?;
    Ok(())
}
