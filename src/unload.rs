//! Delimited-text encoder
//!
//! Writes rows under a [`FileFormat`] so that decoding the output with the
//! same format yields the same values. NULL is written as the format's first
//! `null_if` sentinel; strings that would otherwise read back as NULL, or that
//! contain delimiters or quotes, are enclosed (or escaped when the format has
//! no enclosure character). Inside an enclosure the quote and the escape
//! character are both doubled.

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::{IngestError, IngestResult};
use crate::models::{FileFormat, FormatType, Row, Value};
use crate::store::TableStore;

struct Encoder<'a> {
    format: &'a FileFormat,
    null_text: String,
}

impl<'a> Encoder<'a> {
    fn new(format: &'a FileFormat) -> IngestResult<Self> {
        if format.format_type != FormatType::Csv {
            return Err(IngestError::InvalidDefinition(format!(
                "format '{}' is not delimited text",
                format.name
            )));
        }
        format.validate().map_err(IngestError::InvalidDefinition)?;
        let null_text = match format.null_if.first() {
            Some(sentinel) => sentinel.clone(),
            None if format.empty_field_as_null => String::new(),
            None => {
                return Err(IngestError::InvalidDefinition(format!(
                    "format '{}' has no way to write NULL",
                    format.name
                )));
            }
        };
        Ok(Self { format, null_text })
    }

    fn needs_enclosure(&self, text: &str) -> bool {
        let f = self.format;
        text.is_empty()
            || f.null_if.iter().any(|s| s == text)
            || text.contains(f.field_delimiter)
            || f.record_delimiter.chars().any(|c| text.contains(c))
            || text.contains(['\n', '\r'])
            || f.field_optionally_enclosed_by.is_some_and(|q| text.contains(q))
            || f.escape_unenclosed_field.is_some_and(|e| text.contains(e))
            || (f.trim_space && text.trim() != text)
    }

    fn field(&self, value: &Value) -> IngestResult<String> {
        let text = match value {
            Value::Null => return Ok(self.null_text.clone()),
            Value::Variant(json) => json.to_string(),
            other => other.to_string(),
        };
        if !self.needs_enclosure(&text) {
            return Ok(text);
        }
        match self.format.field_optionally_enclosed_by {
            Some(quote) => Ok(self.enclose(&text, quote)),
            None => self.escape(&text),
        }
    }

    /// Quotes are doubled; the enclosed-field escape character is escaped by itself
    fn enclose(&self, text: &str, quote: char) -> String {
        let escape = self.format.escape.filter(|e| *e != quote);
        let mut out = String::with_capacity(text.len() + 2);
        out.push(quote);
        for c in text.chars() {
            if c == quote {
                out.push(quote);
            } else if Some(c) == escape {
                out.push(c);
                out.push(c);
                continue;
            }
            out.push(c);
        }
        out.push(quote);
        out
    }

    fn escape(&self, text: &str) -> IngestResult<String> {
        let f = self.format;
        let unrepresentable = || {
            IngestError::InvalidDefinition(format!(
                "value '{}' cannot be written under format '{}' without an enclosure character",
                text, f.name
            ))
        };
        let Some(escape) = f.escape_unenclosed_field else {
            return Err(unrepresentable());
        };
        if text.is_empty() || (f.trim_space && text.trim() != text) {
            return Err(unrepresentable());
        }
        // A letter after the escape character reads back as a control character
        let literal_after_escape = |c: char| !matches!(c, 'n' | 't' | 'r' | '0');

        // Text equal to a sentinel gets one escaped character so its raw form differs
        let guard = if f.null_if.iter().any(|s| s == text) {
            let position = text.chars().position(literal_after_escape);
            Some(position.ok_or_else(unrepresentable)?)
        } else {
            None
        };

        let mut out = String::with_capacity(text.len() + 4);
        for (i, c) in text.chars().enumerate() {
            match c {
                '\n' => {
                    out.push(escape);
                    out.push('n');
                }
                '\r' => {
                    out.push(escape);
                    out.push('r');
                }
                c if c == escape
                    || c == f.field_delimiter
                    || f.record_delimiter.contains(c)
                    || guard == Some(i) =>
                {
                    if !literal_after_escape(c) {
                        return Err(unrepresentable());
                    }
                    out.push(escape);
                    out.push(c);
                }
                c => out.push(c),
            }
        }
        Ok(out)
    }

    fn record(&self, values: &[Value], out: &mut String) -> IngestResult<()> {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.push(self.format.field_delimiter);
            }
            out.push_str(&self.field(value)?);
        }
        out.push_str(&self.format.record_delimiter);
        Ok(())
    }
}

/// Encode rows as delimited text, optionally preceded by a header record
pub fn encode_rows(
    columns: &[String],
    rows: &[Row],
    format: &FileFormat,
    header: bool,
) -> IngestResult<String> {
    let encoder = Encoder::new(format)?;
    let mut out = String::new();
    if header {
        let names: Vec<Value> = columns.iter().map(|c| Value::from(c.as_str())).collect();
        encoder.record(&names, &mut out)?;
    }
    for row in rows {
        encoder.record(row, &mut out)?;
    }
    Ok(out)
}

/// Write a table to `path`; returns the number of rows written
pub fn unload_table(
    tables: &dyn TableStore,
    table: &str,
    path: &Path,
    format: &FileFormat,
    header: bool,
) -> IngestResult<usize> {
    let snapshot = tables.snapshot(table)?;
    let text = encode_rows(&snapshot.schema.column_names(), &snapshot.rows, format, header)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)?;

    info!(table = %table, path = %path.display(), rows = snapshot.len(), "Unloaded table");
    Ok(snapshot.len())
}
