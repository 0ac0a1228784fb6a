//! Stage resolution
//!
//! A stage maps a logical source name to a location in external storage.
//! The storage itself is a collaborator behind the [`SourceStore`] trait:
//! the pipeline only lists files and streams their bytes.
//!
//! ## Example
//!
//! ```rust
//! use data_loading_sdk::models::StageLocation;
//! use data_loading_sdk::stage::{MemorySourceStore, StageResolver};
//!
//! let store = MemorySourceStore::new();
//! store.put("memory://trips/2018-01.csv", "1,2\n");
//! store.put("memory://trips/2018-02.csv", "3,4\n");
//! store.put("memory://trips/readme.txt", "notes");
//!
//! let stage = StageLocation::new("trips", "memory://trips/").with_pattern("*.csv");
//! let files = StageResolver::new(&store).resolve(&stage).unwrap();
//! assert_eq!(files.len(), 2);
//! ```

mod local;
mod memory;

use std::io::Read;

use sha2::{Digest, Sha256};

use crate::error::{IngestError, IngestResult};
use crate::models::StageLocation;

pub use local::LocalSourceStore;
pub use memory::MemorySourceStore;

/// Object-storage collaborator
pub trait SourceStore: Send + Sync {
    /// List file URIs under `prefix` whose path relative to the prefix
    /// matches `pattern` (a glob). Results are sorted.
    ///
    /// Returns `NotFound` when the prefix itself is unreachable.
    fn list_files(&self, prefix: &str, pattern: Option<&str>) -> IngestResult<Vec<String>>;

    /// Open a file for streaming
    fn open(&self, uri: &str) -> IngestResult<Box<dyn Read + Send>>;

    /// SHA-256 of a file's content, hex encoded
    fn content_hash(&self, uri: &str) -> IngestResult<String> {
        let mut reader = self.open(uri)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Compile a stage pattern, mapping syntax errors to `InvalidDefinition`
pub(crate) fn compile_pattern(pattern: Option<&str>) -> IngestResult<Option<glob::Pattern>> {
    pattern
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| IngestError::InvalidDefinition(format!("pattern '{}': {}", p, e)))
        })
        .transpose()
}

/// Resolves stages to concrete file lists
pub struct StageResolver<'a> {
    store: &'a dyn SourceStore,
}

impl<'a> StageResolver<'a> {
    pub fn new(store: &'a dyn SourceStore) -> Self {
        Self { store }
    }

    /// List every file of the stage, in lexicographic order
    pub fn resolve(&self, stage: &StageLocation) -> IngestResult<Vec<String>> {
        let files = self
            .store
            .list_files(&stage.url, stage.pattern.as_deref())?;
        if files.is_empty() && !stage.allow_empty {
            return Err(IngestError::NotFound(format!(
                "stage '{}' ({}) has no files{}",
                stage.name,
                stage.url,
                stage
                    .pattern
                    .as_ref()
                    .map(|p| format!(" matching '{}'", p))
                    .unwrap_or_default()
            )));
        }
        tracing::debug!("Stage '{}' resolved to {} file(s)", stage.name, files.len());
        Ok(files)
    }

    /// Resolve an explicit list of file names relative to the stage
    ///
    /// Every named file must exist in the stage listing.
    pub fn resolve_named(&self, stage: &StageLocation, names: &[String]) -> IngestResult<Vec<String>> {
        let listing = self.store.list_files(&stage.url, None)?;
        let mut files = Vec::with_capacity(names.len());
        for name in names {
            let wanted = name.trim_start_matches('/');
            let found = listing
                .iter()
                .find(|uri| uri.as_str() == name || uri.ends_with(&format!("/{}", wanted)))
                .ok_or_else(|| {
                    IngestError::NotFound(format!("file '{}' in stage '{}'", name, stage.name))
                })?;
            files.push(found.clone());
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> MemorySourceStore {
        let store = MemorySourceStore::new();
        store.put("memory://tickit/allusers_pipe.txt", "1|a\n");
        store.put("memory://tickit/venue_pipe.txt", "1|b\n");
        store.put("memory://tickit/sales_tab.txt", "1\tc\n");
        store
    }

    #[test]
    fn resolves_with_pattern() {
        let store = sample_store();
        let stage = StageLocation::new("tickit", "memory://tickit/").with_pattern("*_pipe.txt");
        let files = StageResolver::new(&store).resolve(&stage).unwrap();
        assert_eq!(
            files,
            vec![
                "memory://tickit/allusers_pipe.txt".to_string(),
                "memory://tickit/venue_pipe.txt".to_string()
            ]
        );
    }

    #[test]
    fn empty_stage_is_not_found_unless_allowed() {
        let store = sample_store();
        let mut stage = StageLocation::new("tickit", "memory://tickit/").with_pattern("*.json");
        let err = StageResolver::new(&store).resolve(&stage).unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));

        stage.allow_empty = true;
        assert!(StageResolver::new(&store).resolve(&stage).unwrap().is_empty());
    }

    #[test]
    fn resolves_named_files() {
        let store = sample_store();
        let stage = StageLocation::new("tickit", "memory://tickit/");
        let resolver = StageResolver::new(&store);
        let files = resolver
            .resolve_named(&stage, &["sales_tab.txt".to_string()])
            .unwrap();
        assert_eq!(files, vec!["memory://tickit/sales_tab.txt".to_string()]);
        assert!(resolver
            .resolve_named(&stage, &["missing.txt".to_string()])
            .is_err());
    }

    #[test]
    fn content_hash_is_stable() {
        let store = sample_store();
        let a = store.content_hash("memory://tickit/venue_pipe.txt").unwrap();
        let b = store.content_hash("memory://tickit/venue_pipe.txt").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
