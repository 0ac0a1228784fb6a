//! Format decoding
//!
//! A [`Decoder`] turns one staged file into a lazy sequence of raw records.
//! Each record is either decoded ([`RawRecord`]) or rejected with the record
//! text preserved ([`DecodeFailure`]); a bad record never stops the file
//! unless the input itself can no longer be read.
//!
//! Values stay untyped here. Casting to column types happens in
//! [`crate::load`], where the target schema is known.
//!
//! ## Example
//!
//! ```rust
//! use std::io::Cursor;
//! use data_loading_sdk::decode::{Decoder, RawRow};
//! use data_loading_sdk::models::FileFormat;
//!
//! let format = FileFormat::csv("pipe").with_delimiter('|').with_null_if(&[""]);
//! let input = Cursor::new(b"1|Pier 40||NULL\n".to_vec());
//! let mut decoder = Decoder::from_reader("venue.txt", Box::new(input), &format).unwrap();
//!
//! let record = decoder.next().unwrap().unwrap();
//! assert_eq!(
//!     record.row,
//!     RawRow::Delimited(vec![
//!         Some("1".to_string()),
//!         Some("Pier 40".to_string()),
//!         None,
//!         Some("NULL".to_string()),
//!     ])
//! );
//! ```

mod delimited;
mod json;
pub mod temporal;

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult, RowError};
use crate::models::{FileFormat, FormatType};
use crate::stage::SourceStore;
use delimited::Tokenizer;
use json::JsonDocuments;

/// Undecoded record content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "lowercase")]
pub enum RawRow {
    /// Delimited fields, `None` where the field decoded to NULL
    Delimited(Vec<Option<String>>),
    /// One JSON document
    Json(serde_json::Value),
    /// Record text that could not be split into fields
    Unparsed(String),
}

impl RawRow {
    /// Number of fields (JSON documents count as one)
    pub fn width(&self) -> usize {
        match self {
            RawRow::Delimited(fields) => fields.len(),
            RawRow::Json(_) => 1,
            RawRow::Unparsed(_) => 0,
        }
    }
}

impl fmt::Display for RawRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawRow::Delimited(fields) => {
                let parts: Vec<&str> = fields
                    .iter()
                    .map(|v| v.as_deref().unwrap_or("NULL"))
                    .collect();
                write!(f, "[{}]", parts.join(", "))
            }
            RawRow::Json(doc) => write!(f, "{}", doc),
            RawRow::Unparsed(text) => write!(f, "{}", text),
        }
    }
}

/// A decoded record and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub file: String,
    /// 1-based physical record number within the file
    pub record_number: u64,
    pub row: RawRow,
}

/// A record the decoder rejected
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub file: String,
    pub record_number: u64,
    pub error: RowError,
    pub raw: RawRow,
}

enum Source {
    Delimited {
        tokenizer: Tokenizer,
        skip_remaining: usize,
        skip_blank_lines: bool,
    },
    Json(JsonDocuments),
}

/// Streaming decoder over one file
pub struct Decoder {
    file: String,
    source: Source,
    record_number: u64,
    expected_width: Option<usize>,
    error_on_column_count_mismatch: bool,
    finished: bool,
}

impl Decoder {
    /// Open `uri` through the store and decode it under `format`
    pub fn open(store: &dyn SourceStore, uri: &str, format: &FileFormat) -> IngestResult<Self> {
        let reader = store.open(uri)?;
        Self::from_reader(uri, reader, format)
    }

    /// Decode an already-open reader
    pub fn from_reader(
        file: impl Into<String>,
        reader: Box<dyn Read + Send>,
        format: &FileFormat,
    ) -> IngestResult<Self> {
        format.validate().map_err(IngestError::InvalidDefinition)?;
        let source = match format.format_type {
            FormatType::Csv => Source::Delimited {
                tokenizer: Tokenizer::new(reader, format),
                skip_remaining: format.skip_header,
                skip_blank_lines: format.skip_blank_lines,
            },
            FormatType::Json => Source::Json(JsonDocuments::new(reader, format.strip_outer_array)),
        };
        Ok(Self {
            file: file.into(),
            source,
            record_number: 0,
            expected_width: None,
            error_on_column_count_mismatch: format.error_on_column_count_mismatch,
            finished: false,
        })
    }

    /// Enforce a field count on delimited records
    ///
    /// With `error_on_column_count_mismatch` set, records of any other width
    /// are rejected. Otherwise short records are padded with NULL and long
    /// records are truncated.
    pub fn expect_width(mut self, width: usize) -> Self {
        self.expected_width = Some(width);
        self
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    fn failure(&self, error: RowError, raw: RawRow) -> DecodeFailure {
        DecodeFailure {
            file: self.file.clone(),
            record_number: self.record_number,
            error,
            raw,
        }
    }

    fn shape(&self, mut fields: Vec<Option<String>>) -> Result<RawRow, DecodeFailure> {
        if let Some(expected) = self.expected_width
            && fields.len() != expected
        {
            if self.error_on_column_count_mismatch {
                let found = fields.len();
                return Err(self.failure(
                    RowError::ColumnCountMismatch { expected, found },
                    RawRow::Delimited(fields),
                ));
            }
            fields.resize(expected, None);
        }
        Ok(RawRow::Delimited(fields))
    }

    fn next_delimited(&mut self) -> Option<Result<RawRecord, DecodeFailure>> {
        loop {
            let Source::Delimited {
                tokenizer,
                skip_remaining,
                skip_blank_lines,
            } = &mut self.source
            else {
                return None;
            };
            let next = match tokenizer.next_record() {
                Ok(next) => next,
                Err(e) => {
                    self.finished = true;
                    self.record_number += 1;
                    return Some(Err(self.failure(
                        RowError::decode(format!("read error: {}", e)),
                        RawRow::Unparsed(String::new()),
                    )));
                }
            };
            let skip_blank = *skip_blank_lines;
            let skipping = *skip_remaining > 0;
            if skipping {
                *skip_remaining -= 1;
            }
            match next {
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Ok(Some(record)) => {
                    self.record_number += 1;
                    if skipping || (skip_blank && record.blank) {
                        continue;
                    }
                    let record_number = self.record_number;
                    return Some(self.shape(record.fields).map(|row| RawRecord {
                        file: self.file.clone(),
                        record_number,
                        row,
                    }));
                }
                Err(e) => {
                    self.record_number += 1;
                    if skipping {
                        continue;
                    }
                    return Some(Err(self.failure(e.error, RawRow::Unparsed(e.text))));
                }
            }
        }
    }

    fn next_json(&mut self) -> Option<Result<RawRecord, DecodeFailure>> {
        let Source::Json(documents) = &mut self.source else {
            return None;
        };
        let next = documents.next();
        match next {
            None => {
                self.finished = true;
                None
            }
            Some(Ok(doc)) => {
                self.record_number += 1;
                Some(Ok(RawRecord {
                    file: self.file.clone(),
                    record_number: self.record_number,
                    row: RawRow::Json(doc),
                }))
            }
            Some(Err(message)) => {
                self.record_number += 1;
                self.finished = true;
                Some(Err(self.failure(
                    RowError::decode(format!("malformed JSON: {}", message)),
                    RawRow::Unparsed(message),
                )))
            }
        }
    }
}

impl Iterator for Decoder {
    type Item = Result<RawRecord, DecodeFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.source {
            Source::Delimited { .. } => self.next_delimited(),
            Source::Json(_) => self.next_json(),
        }
    }
}
