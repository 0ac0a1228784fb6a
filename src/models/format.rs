//! File format model
//!
//! A [`FileFormat`] describes how raw bytes in a stage become rows. Formats
//! are owned independently of tables and referenced by name at load time.

use super::enums::{FormatType, TemporalFormat};
use serde::{Deserialize, Serialize};

/// Named description of a source file layout
///
/// Defaults follow common warehouse behaviour: comma delimited, newline
/// terminated, `\N` as the null sentinel, backslash escapes in unenclosed
/// fields, empty unenclosed fields read as NULL, and column-count mismatches
/// rejected.
///
/// # Example
///
/// ```rust
/// use data_loading_sdk::models::FileFormat;
///
/// let pipe = FileFormat::csv("pipe_format").with_delimiter('|').with_skip_header(1);
/// assert_eq!(pipe.field_delimiter, '|');
/// assert!(pipe.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileFormat {
    /// Format name
    pub name: String,
    /// Source kind
    #[serde(rename = "type", default)]
    pub format_type: FormatType,
    /// Single-byte field separator
    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: char,
    /// Record separator (`\n` also accepts `\r\n`)
    #[serde(default = "default_record_delimiter")]
    pub record_delimiter: String,
    /// Number of leading records to skip
    #[serde(default)]
    pub skip_header: usize,
    /// Optional enclosing quote character
    #[serde(default)]
    pub field_optionally_enclosed_by: Option<char>,
    /// Escape character active inside enclosed fields
    #[serde(default)]
    pub escape: Option<char>,
    /// Escape character active inside unenclosed fields (`None` disables it)
    #[serde(default = "default_escape_unenclosed")]
    pub escape_unenclosed_field: Option<char>,
    /// Sentinel strings that decode to NULL in unenclosed fields
    #[serde(default = "default_null_if")]
    pub null_if: Vec<String>,
    /// Whether an empty unenclosed field is NULL
    #[serde(default = "default_true")]
    pub empty_field_as_null: bool,
    /// Trim surrounding whitespace from unenclosed fields
    #[serde(default)]
    pub trim_space: bool,
    /// Skip records with no content at all
    #[serde(default)]
    pub skip_blank_lines: bool,
    /// Reject records whose field count differs from the target table
    #[serde(default = "default_true")]
    pub error_on_column_count_mismatch: bool,
    /// Date parsing mode
    #[serde(default)]
    pub date_format: TemporalFormat,
    /// Timestamp parsing mode
    #[serde(default)]
    pub timestamp_format: TemporalFormat,
    /// Time-of-day parsing mode
    #[serde(default)]
    pub time_format: TemporalFormat,
    /// Unwrap a top-level JSON array into one row per element
    #[serde(default)]
    pub strip_outer_array: bool,
}

fn default_field_delimiter() -> char {
    ','
}

fn default_record_delimiter() -> String {
    "\n".to_string()
}

fn default_escape_unenclosed() -> Option<char> {
    Some('\\')
}

fn default_null_if() -> Vec<String> {
    vec!["\\N".to_string()]
}

fn default_true() -> bool {
    true
}

impl FileFormat {
    /// Delimited-text format with default options
    pub fn csv(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format_type: FormatType::Csv,
            field_delimiter: default_field_delimiter(),
            record_delimiter: default_record_delimiter(),
            skip_header: 0,
            field_optionally_enclosed_by: None,
            escape: None,
            escape_unenclosed_field: default_escape_unenclosed(),
            null_if: default_null_if(),
            empty_field_as_null: true,
            trim_space: false,
            skip_blank_lines: false,
            error_on_column_count_mismatch: true,
            date_format: TemporalFormat::Auto,
            timestamp_format: TemporalFormat::Auto,
            time_format: TemporalFormat::Auto,
            strip_outer_array: false,
        }
    }

    /// JSON format with default options
    pub fn json(name: impl Into<String>) -> Self {
        Self {
            format_type: FormatType::Json,
            ..Self::csv(name)
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.field_delimiter = delimiter;
        self
    }

    pub fn with_skip_header(mut self, skip: usize) -> Self {
        self.skip_header = skip;
        self
    }

    pub fn with_enclosure(mut self, quote: char) -> Self {
        self.field_optionally_enclosed_by = Some(quote);
        self
    }

    pub fn with_null_if(mut self, sentinels: &[&str]) -> Self {
        self.null_if = sentinels.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_escape_unenclosed(mut self, escape: Option<char>) -> Self {
        self.escape_unenclosed_field = escape;
        self
    }

    pub fn with_column_count_check(mut self, enabled: bool) -> Self {
        self.error_on_column_count_mismatch = enabled;
        self
    }

    pub fn with_strip_outer_array(mut self, strip: bool) -> Self {
        self.strip_outer_array = strip;
        self
    }

    /// Whether an unenclosed field's raw text decodes to NULL
    ///
    /// `raw` is the field text before escape processing, already trimmed
    /// when `trim_space` is set.
    pub fn is_null_token(&self, raw: &str) -> bool {
        if raw.is_empty() && self.empty_field_as_null {
            return true;
        }
        self.null_if.iter().any(|s| s == raw)
    }

    /// Check that the format is internally consistent
    pub fn validate(&self) -> Result<(), String> {
        if self.format_type == FormatType::Json {
            return Ok(());
        }
        let single_byte = |c: char, what: &str| -> Result<(), String> {
            if c.is_ascii() {
                Ok(())
            } else {
                Err(format!(
                    "format '{}': {} must be a single-byte ASCII character (got '{}')",
                    self.name, what, c
                ))
            }
        };
        single_byte(self.field_delimiter, "field_delimiter")?;
        if self.record_delimiter.is_empty() || !self.record_delimiter.is_ascii() {
            return Err(format!(
                "format '{}': record_delimiter must be a non-empty ASCII string",
                self.name
            ));
        }
        if self.record_delimiter.contains(self.field_delimiter) {
            return Err(format!(
                "format '{}': field and record delimiters overlap",
                self.name
            ));
        }
        if let Some(q) = self.field_optionally_enclosed_by {
            single_byte(q, "field_optionally_enclosed_by")?;
            if q == self.field_delimiter {
                return Err(format!(
                    "format '{}': enclosure character cannot equal the field delimiter",
                    self.name
                ));
            }
        }
        if let Some(e) = self.escape {
            single_byte(e, "escape")?;
        }
        if let Some(e) = self.escape_unenclosed_field {
            single_byte(e, "escape_unenclosed_field")?;
            if e == self.field_delimiter {
                return Err(format!(
                    "format '{}': escape character cannot equal the field delimiter",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults_match_constructor() {
        let parsed: FileFormat = serde_yaml::from_str("name: csv\n").unwrap();
        assert_eq!(parsed, FileFormat::csv("csv"));
    }

    #[test]
    fn parses_tab_and_pipe_formats() {
        let yaml = r#"
name: tab_format
type: CSV
field_delimiter: "\t"
skip_header: 1
null_if: ["", "NULL"]
"#;
        let format: FileFormat = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(format.field_delimiter, '\t');
        assert_eq!(format.null_if, vec!["".to_string(), "NULL".to_string()]);
        assert!(format.validate().is_ok());
    }

    #[test]
    fn null_tokens() {
        let format = FileFormat::csv("f").with_null_if(&[""]);
        assert!(format.is_null_token(""));
        assert!(!format.is_null_token("NULL"));

        let mut strict = FileFormat::csv("g").with_null_if(&["NULL"]);
        strict.empty_field_as_null = false;
        assert!(!strict.is_null_token(""));
        assert!(strict.is_null_token("NULL"));
    }

    #[test]
    fn rejects_conflicting_characters() {
        let bad = FileFormat::csv("bad").with_enclosure(',');
        assert!(bad.validate().is_err());

        let mut multi = FileFormat::csv("multi");
        multi.field_delimiter = '¦';
        assert!(multi.validate().is_err());
    }
}
