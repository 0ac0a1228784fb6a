//! Local filesystem source store

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::{SourceStore, compile_pattern};
use crate::error::{IngestError, IngestResult};

/// Source store reading from the local filesystem
///
/// Stage URLs may be `file://` URLs, absolute paths, or paths relative to the
/// store's base directory.
#[derive(Debug, Clone, Default)]
pub struct LocalSourceStore {
    base_dir: Option<PathBuf>,
}

impl LocalSourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative stage URLs against `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve_path(&self, url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl SourceStore for LocalSourceStore {
    fn list_files(&self, prefix: &str, pattern: Option<&str>) -> IngestResult<Vec<String>> {
        let root = self.resolve_path(prefix);
        let pattern = compile_pattern(pattern)?;

        if root.is_file() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let matched = pattern.as_ref().is_none_or(|p| p.matches(&name));
            return Ok(if matched {
                vec![root.display().to_string()]
            } else {
                Vec::new()
            });
        }
        if !root.is_dir() {
            return Err(IngestError::NotFound(format!(
                "stage location '{}'",
                root.display()
            )));
        }

        // Build the glob pattern
        let full_pattern = format!("{}/**/*", glob::Pattern::escape(&root.display().to_string()));
        let entries = glob::glob(&full_pattern)
            .map_err(|e| IngestError::InvalidDefinition(format!("{}: {}", prefix, e)))?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => {
                    if !path.is_file() {
                        continue;
                    }
                    let relative = path
                        .strip_prefix(&root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    if pattern.as_ref().is_none_or(|p| p.matches(&relative)) {
                        files.push(path.display().to_string());
                    }
                }
                Err(e) => {
                    // Log but continue
                    tracing::warn!("Error accessing path: {}", e);
                }
            }
        }

        // Sort by path for consistent ordering
        files.sort();
        Ok(files)
    }

    fn open(&self, uri: &str) -> IngestResult<Box<dyn Read + Send>> {
        let path = self.resolve_path(uri);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                IngestError::NotFound(format!("file '{}'", path.display()))
            }
            _ => IngestError::Io(e),
        })?;
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        tracing::debug!("Opened {} ({} bytes)", path.display(), size);
        Ok(Box::new(BufReader::new(file)))
    }
}
