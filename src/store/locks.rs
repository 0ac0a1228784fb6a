//! Per-table write locks

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

/// Exclusive hold on one table, released on drop
pub type TableGuard = ArcMutexGuard<RawMutex, ()>;

/// Hands out one exclusive lock per table name
///
/// A load holds its target's lock for the whole invocation; a materialized
/// transform holds it while swapping. Readers never take these locks.
#[derive(Debug, Default)]
pub struct TableLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, table: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(table.to_ascii_lowercase())
            .or_default()
            .clone()
    }

    /// Block until `table` is free, then hold it
    pub fn lock(&self, table: &str) -> TableGuard {
        self.handle(table).lock_arc()
    }

    /// Hold `table` if it is free right now
    pub fn try_lock(&self, table: &str) -> Option<TableGuard> {
        self.handle(table).try_lock_arc()
    }

    /// Hold several tables, acquired in name order so concurrent callers cannot deadlock
    pub fn lock_all(&self, tables: &[&str]) -> Vec<TableGuard> {
        let mut names: Vec<String> = tables.iter().map(|t| t.to_ascii_lowercase()).collect();
        names.sort();
        names.dedup();
        names.iter().map(|name| self.lock(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive_per_table() {
        let locks = TableLocks::new();
        let guard = locks.lock("trips");
        assert!(locks.try_lock("TRIPS").is_none());
        assert!(locks.try_lock("weather").is_some());
        drop(guard);
        assert!(locks.try_lock("trips").is_some());
    }

    #[test]
    fn lock_all_dedups() {
        let locks = TableLocks::new();
        let guards = locks.lock_all(&["b", "a", "B"]);
        assert_eq!(guards.len(), 2);
    }
}
