//! In-memory source store

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{SourceStore, compile_pattern};
use crate::error::{IngestError, IngestResult};

/// Source store backed by a map of URI → bytes
///
/// Useful for embedding and tests. Cloning shares the underlying files.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceStore {
    files: Arc<RwLock<BTreeMap<String, Arc<Vec<u8>>>>>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn put(&self, uri: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files
            .write()
            .insert(uri.into(), Arc::new(content.into()));
    }

    pub fn remove(&self, uri: &str) -> bool {
        self.files.write().remove(uri).is_some()
    }
}

impl SourceStore for MemorySourceStore {
    fn list_files(&self, prefix: &str, pattern: Option<&str>) -> IngestResult<Vec<String>> {
        let pattern = compile_pattern(pattern)?;
        let files = self.files.read();
        let listed = files
            .keys()
            .filter(|uri| uri.starts_with(prefix))
            .filter(|uri| {
                let relative = uri[prefix.len()..].trim_start_matches('/');
                pattern.as_ref().is_none_or(|p| p.matches(relative))
            })
            .cloned()
            .collect();
        Ok(listed)
    }

    fn open(&self, uri: &str) -> IngestResult<Box<dyn Read + Send>> {
        let content = self
            .files
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| IngestError::NotFound(format!("file '{}'", uri)))?;
        Ok(Box::new(Cursor::new(SharedBytes(content))))
    }
}

/// Owned handle so readers outlive the store lock
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_reads_content() {
        let store = MemorySourceStore::new();
        store.put("memory://a/b.csv", "x,y\n");
        let mut out = String::new();
        store
            .open("memory://a/b.csv")
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "x,y\n");
        assert!(store.open("memory://a/c.csv").is_err());
    }

    #[test]
    fn listing_is_sorted_and_prefix_scoped() {
        let store = MemorySourceStore::new();
        store.put("memory://s/2.csv", "");
        store.put("memory://s/1.csv", "");
        store.put("memory://other/3.csv", "");
        let files = store.list_files("memory://s/", None).unwrap();
        assert_eq!(files, vec!["memory://s/1.csv", "memory://s/2.csv"]);
    }
}
