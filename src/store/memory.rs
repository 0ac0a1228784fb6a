//! In-memory table store with optional JSON persistence

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{StoreError, TableSnapshot, TableStore};
use crate::models::{Row, TableSchema};

#[derive(Debug, Clone)]
struct StoredTable {
    schema: TableSchema,
    rows: Arc<Vec<Row>>,
}

/// Flat on-disk form
#[derive(Default, Serialize, Deserialize)]
struct PersistedState {
    tables: Vec<PersistedTable>,
}

#[derive(Serialize, Deserialize)]
struct PersistedTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

/// Table store holding every table in memory
///
/// Appends are copy-on-write against outstanding snapshots, so readers
/// always see either all or none of an append. Cloning shares the tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    tables: Arc<RwLock<BTreeMap<String, StoredTable>>>,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store saved with [`MemoryTableStore::save_to`]
    ///
    /// A missing file yields an empty store.
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let json = std::fs::read_to_string(path)?;
        let state: PersistedState =
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tables = state
            .tables
            .into_iter()
            .map(|t| {
                (
                    key(&t.schema.name),
                    StoredTable {
                        schema: t.schema,
                        rows: Arc::new(t.rows),
                    },
                )
            })
            .collect();
        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
        })
    }

    /// Write every table to `path` (via a temporary file and a rename)
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        let state = PersistedState {
            tables: self
                .tables
                .read()
                .values()
                .map(|t| PersistedTable {
                    schema: t.schema.clone(),
                    rows: t.rows.as_ref().clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl TableStore for MemoryTableStore {
    fn create_table(&self, schema: TableSchema, replace: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let k = key(&schema.name);
        if tables.contains_key(&k) && !replace {
            return Err(StoreError::TableExists(schema.name));
        }
        tables.insert(
            k,
            StoredTable {
                schema,
                rows: Arc::new(Vec::new()),
            },
        );
        Ok(())
    }

    fn drop_table(&self, name: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .remove(&key(name))
            .map(|_| ())
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn schema(&self, name: &str) -> Result<TableSchema, StoreError> {
        self.tables
            .read()
            .get(&key(name))
            .map(|t| t.schema.clone())
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn append_rows(&self, name: &str, rows: Vec<Row>) -> Result<usize, StoreError> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&key(name))
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        let expected = table.schema.width();
        if let Some(bad) = rows.iter().find(|r| r.len() != expected) {
            return Err(StoreError::WidthMismatch {
                table: table.schema.name.clone(),
                expected,
                found: bad.len(),
            });
        }
        let count = rows.len();
        Arc::make_mut(&mut table.rows).extend(rows);
        Ok(count)
    }

    fn snapshot(&self, name: &str) -> Result<TableSnapshot, StoreError> {
        self.tables
            .read()
            .get(&key(name))
            .map(|t| TableSnapshot {
                schema: t.schema.clone(),
                rows: Arc::clone(&t.rows),
            })
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn truncate(&self, name: &str) -> Result<usize, StoreError> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&key(name))
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        let removed = table.rows.len();
        table.rows = Arc::new(Vec::new());
        Ok(removed)
    }

    fn atomic_swap(&self, a: &str, b: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let (ka, kb) = (key(a), key(b));
        let first = tables
            .remove(&ka)
            .ok_or_else(|| StoreError::TableNotFound(a.to_string()))?;
        let Some(second) = tables.remove(&kb) else {
            tables.insert(ka, first);
            return Err(StoreError::TableNotFound(b.to_string()));
        };
        let first_name = first.schema.name.clone();
        let second_name = second.schema.name.clone();
        tables.insert(
            ka,
            StoredTable {
                schema: second.schema.renamed(first_name),
                rows: second.rows,
            },
        );
        tables.insert(
            kb,
            StoredTable {
                schema: first.schema.renamed(second_name),
                rows: first.rows,
            },
        );
        Ok(())
    }

    fn table_names(&self) -> Vec<String> {
        self.tables
            .read()
            .values()
            .map(|t| t.schema.name.clone())
            .collect()
    }
}
