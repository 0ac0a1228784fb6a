//! Table storage
//!
//! The pipeline writes to and reads from tables through the [`TableStore`]
//! trait. Table names are case-insensitive.

mod locks;
mod memory;

use std::sync::Arc;

use thiserror::Error;

use crate::models::{Row, TableSchema};

pub use locks::{TableGuard, TableLocks};
pub use memory::MemoryTableStore;

/// Errors from table storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Row width {found} does not match table '{table}' ({expected} columns)")]
    WidthMismatch {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Point-in-time view of one table
///
/// Holding a snapshot never blocks writers; later appends are not visible
/// through it.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub schema: TableSchema,
    pub rows: Arc<Vec<Row>>,
}

impl TableSnapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Table storage collaborator
pub trait TableStore: Send + Sync {
    /// Create a table; with `replace` an existing table is dropped first
    fn create_table(&self, schema: TableSchema, replace: bool) -> Result<(), StoreError>;

    fn drop_table(&self, name: &str) -> Result<(), StoreError>;

    fn schema(&self, name: &str) -> Result<TableSchema, StoreError>;

    /// Append rows as one atomic step; returns the number appended
    fn append_rows(&self, name: &str, rows: Vec<Row>) -> Result<usize, StoreError>;

    fn snapshot(&self, name: &str) -> Result<TableSnapshot, StoreError>;

    /// Remove every row; returns the number removed
    fn truncate(&self, name: &str) -> Result<usize, StoreError>;

    /// Exchange the contents (schema and rows) of two tables in one step
    fn atomic_swap(&self, a: &str, b: &str) -> Result<(), StoreError>;

    /// Table names, sorted
    fn table_names(&self) -> Vec<String>;

    fn has_table(&self, name: &str) -> bool {
        self.schema(name).is_ok()
    }

    /// Rows matching `predicate`, in storage order
    fn read_rows(
        &self,
        name: &str,
        predicate: &dyn Fn(&Row) -> bool,
    ) -> Result<Vec<Row>, StoreError> {
        let snapshot = self.snapshot(name)?;
        Ok(snapshot
            .rows
            .iter()
            .filter(|row| predicate(row))
            .cloned()
            .collect())
    }
}
