//! Enums for loading and transformation
//!
//! # Serde Casing Conventions
//!
//! - `SCREAMING_SNAKE_CASE`: warehouse keywords (FormatType, ErrorPolicy)
//! - `lowercase`: simple keywords (Materialization)
//!
//! `ErrorPolicy` and `TemporalFormat` carry data and (de)serialize through
//! their `FromStr`/`Display` forms so that catalog files can write
//! `on_error: SKIP_FILE_3` or `date_format: AUTO`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kind of source file a format decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatType {
    /// Delimited text (comma, pipe, tab, ...)
    #[default]
    Csv,
    /// JSON documents (single, concatenated, newline-delimited or wrapped in an array)
    Json,
}

/// What the load executor does with a rejected row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// The first rejection fails the whole load; nothing is committed
    #[default]
    Abort,
    /// Record the rejection and carry on with the next row
    Continue,
    /// Abandon the current file on its first rejection and carry on with the next file
    SkipFile,
    /// Abandon the current file once it reaches the given number of rejections
    SkipFileAfter(u32),
}

impl ErrorPolicy {
    /// Rejections a file may accumulate before it is abandoned (`None` = never)
    pub fn file_rejection_limit(&self) -> Option<u32> {
        match self {
            ErrorPolicy::Abort | ErrorPolicy::Continue => None,
            ErrorPolicy::SkipFile => Some(1),
            ErrorPolicy::SkipFileAfter(n) => Some((*n).max(1)),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Abort => write!(f, "ABORT_STATEMENT"),
            ErrorPolicy::Continue => write!(f, "CONTINUE"),
            ErrorPolicy::SkipFile => write!(f, "SKIP_FILE"),
            ErrorPolicy::SkipFileAfter(n) => write!(f, "SKIP_FILE_{}", n),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase().replace('-', "_");
        match upper.as_str() {
            "ABORT" | "ABORT_STATEMENT" => Ok(ErrorPolicy::Abort),
            "CONTINUE" => Ok(ErrorPolicy::Continue),
            "SKIP_FILE" => Ok(ErrorPolicy::SkipFile),
            other => {
                if let Some(n) = other.strip_prefix("SKIP_FILE_")
                    && let Ok(n) = n.parse::<u32>()
                    && n > 0
                {
                    return Ok(ErrorPolicy::SkipFileAfter(n));
                }
                Err(format!(
                    "Unknown error policy: {}. Use 'abort', 'continue', 'skip_file' or 'skip_file_<n>'.",
                    s
                ))
            }
        }
    }
}

impl Serialize for ErrorPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ErrorPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How date and timestamp fields are parsed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemporalFormat {
    /// Try a fixed ordered list of known layouts
    #[default]
    Auto,
    /// A single chrono format string
    Fixed(String),
}

impl fmt::Display for TemporalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalFormat::Auto => write!(f, "AUTO"),
            TemporalFormat::Fixed(pattern) => write!(f, "{}", pattern),
        }
    }
}

impl Serialize for TemporalFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TemporalFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.eq_ignore_ascii_case("auto") || raw.is_empty() {
            Ok(TemporalFormat::Auto)
        } else {
            Ok(TemporalFormat::Fixed(raw))
        }
    }
}

/// How a transform's output is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    /// Recomputed on every read
    View,
    /// Rebuilt on every transform run and swapped in atomically
    #[default]
    Table,
}
