//! Load history
//!
//! Records which files have been loaded into which table, keyed by URI and
//! content hash, so that re-running a load skips files that were already
//! committed. Truncating a table clears its history.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::StoreError;

/// One committed file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadHistoryEntry {
    pub file: String,
    /// SHA-256 of the file content, hex encoded
    pub content_hash: String,
    pub rows_loaded: u64,
    pub load_id: Uuid,
    pub loaded_at: DateTime<Utc>,
}

/// Per-table load history
#[derive(Debug, Default)]
pub struct LoadHistory {
    tables: RwLock<BTreeMap<String, BTreeMap<String, LoadHistoryEntry>>>,
}

fn key(table: &str) -> String {
    table.to_ascii_lowercase()
}

impl LoadHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `file` with this exact content was already loaded into `table`
    pub fn is_loaded(&self, table: &str, file: &str, content_hash: &str) -> bool {
        self.tables
            .read()
            .get(&key(table))
            .and_then(|files| files.get(file))
            .is_some_and(|entry| entry.content_hash == content_hash)
    }

    pub fn record(&self, table: &str, entry: LoadHistoryEntry) {
        self.tables
            .write()
            .entry(key(table))
            .or_default()
            .insert(entry.file.clone(), entry);
    }

    /// Entries for `table`, ordered by file
    pub fn entries(&self, table: &str) -> Vec<LoadHistoryEntry> {
        self.tables
            .read()
            .get(&key(table))
            .map(|files| files.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget every file loaded into `table`
    pub fn clear_table(&self, table: &str) -> usize {
        self.tables
            .write()
            .remove(&key(table))
            .map(|files| files.len())
            .unwrap_or(0)
    }

    /// Load history saved with [`LoadHistory::save_to`]; a missing file is empty history
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)?;
        let tables = serde_json::from_str(&json)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&*self.tables.read())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file: &str, hash: &str) -> LoadHistoryEntry {
        LoadHistoryEntry {
            file: file.to_string(),
            content_hash: hash.to_string(),
            rows_loaded: 3,
            load_id: Uuid::new_v4(),
            loaded_at: Utc::now(),
        }
    }

    #[test]
    fn matches_on_file_and_hash() {
        let history = LoadHistory::new();
        history.record("Trips", entry("a.csv", "h1"));
        assert!(history.is_loaded("trips", "a.csv", "h1"));
        assert!(!history.is_loaded("trips", "a.csv", "h2"));
        assert!(!history.is_loaded("weather", "a.csv", "h1"));
        assert_eq!(history.clear_table("TRIPS"), 1);
        assert!(!history.is_loaded("trips", "a.csv", "h1"));
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let history = LoadHistory::new();
        history.record("trips", entry("a.csv", "h1"));
        history.save_to(&path).unwrap();
        let restored = LoadHistory::load_from(&path).unwrap();
        assert_eq!(restored.entries("trips"), history.entries("trips"));
    }
}
