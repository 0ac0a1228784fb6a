//! Stage model: a named, read-only pointer into external storage

use serde::{Deserialize, Serialize};

/// A stage location: URL prefix plus optional file-name pattern
///
/// The URL is interpreted by the configured [`SourceStore`](crate::stage::SourceStore):
/// `file://` URLs and bare paths for the local store, `memory://` for the
/// in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageLocation {
    /// Stage name
    pub name: String,
    /// URL prefix of the files
    pub url: String,
    /// Glob applied to file paths relative to the prefix (e.g. `"*.csv"`, `"**/trips_*.csv.gz"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Format used when a load does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_format: Option<String>,
    /// Whether an empty listing is acceptable
    #[serde(default)]
    pub allow_empty: bool,
}

impl StageLocation {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            pattern: None,
            file_format: None,
            allow_empty: false,
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_file_format(mut self, format: impl Into<String>) -> Self {
        self.file_format = Some(format.into());
        self
    }
}
