//! Delimited text tokenizer
//!
//! Splits a byte stream into records and fields under a [`FileFormat`]. The
//! tokenizer is lazy: it buffers only what the current record needs.

use std::io::{self, Read};

use crate::error::RowError;
use crate::models::FileFormat;

const CHUNK_SIZE: usize = 64 * 1024;

/// Refillable look-ahead buffer over a reader
struct ByteBuffer {
    reader: Box<dyn Read + Send>,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl ByteBuffer {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(CHUNK_SIZE),
            pos: 0,
            eof: false,
        }
    }

    /// Make at least `need` unread bytes available, unless the input ends first
    fn fill(&mut self, need: usize) -> io::Result<()> {
        if self.buf.len() - self.pos >= need {
            return Ok(());
        }
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        let mut chunk = [0u8; CHUNK_SIZE];
        while self.buf.len() < need && !self.eof {
            let n = self.reader.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
        Ok(())
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        self.fill(1)?;
        Ok(self.buf.get(self.pos).copied())
    }

    fn starts_with(&mut self, pattern: &[u8]) -> io::Result<bool> {
        self.fill(pattern.len())?;
        Ok(self.buf[self.pos..].starts_with(pattern))
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }
}

/// One tokenized record
#[derive(Debug)]
pub(crate) struct Tokenized {
    /// Fields; `None` is an absent (NULL) value
    pub fields: Vec<Option<String>>,
    /// Raw bytes of the record, without its terminator
    pub text: String,
    /// No bytes at all before the terminator
    pub blank: bool,
}

/// A record that could not be tokenized
#[derive(Debug)]
pub(crate) struct TokenizeError {
    pub error: RowError,
    pub text: String,
}

#[derive(Default)]
struct FieldBuf {
    value: Vec<u8>,
    raw: Vec<u8>,
    enclosed: bool,
}

enum State {
    FieldStart,
    Unenclosed,
    Enclosed,
    AfterEnclosure,
}

/// Record-level tokenizer
pub(crate) struct Tokenizer {
    input: ByteBuffer,
    delimiter: u8,
    terminator: Vec<u8>,
    accept_crlf: bool,
    quote: Option<u8>,
    escape: Option<u8>,
    escape_unenclosed: Option<u8>,
    trim_space: bool,
    format: FileFormat,
    record: Vec<u8>,
}

impl Tokenizer {
    /// The format must already have passed [`FileFormat::validate`]
    pub fn new(reader: Box<dyn Read + Send>, format: &FileFormat) -> Self {
        let ascii = |c: char| c as u8;
        Self {
            input: ByteBuffer::new(reader),
            delimiter: ascii(format.field_delimiter),
            terminator: format.record_delimiter.as_bytes().to_vec(),
            accept_crlf: format.record_delimiter == "\n",
            quote: format.field_optionally_enclosed_by.map(ascii),
            escape: format.escape.map(ascii),
            escape_unenclosed: format.escape_unenclosed_field.map(ascii),
            trim_space: format.trim_space,
            format: format.clone(),
            record: Vec::new(),
        }
    }

    /// Consume a record terminator at the cursor, if there is one
    fn take_terminator(&mut self) -> io::Result<bool> {
        if self.input.starts_with(&self.terminator)? {
            self.input.advance(self.terminator.len());
            return Ok(true);
        }
        if self.accept_crlf && self.input.starts_with(b"\r\n")? {
            self.input.advance(2);
            return Ok(true);
        }
        Ok(false)
    }

    fn bump(&mut self) -> io::Result<Option<u8>> {
        let byte = self.input.peek()?;
        if let Some(b) = byte {
            self.input.advance(1);
            self.record.push(b);
        }
        Ok(byte)
    }

    /// Skip the rest of a broken record
    fn resync(&mut self) -> io::Result<()> {
        loop {
            if self.take_terminator()? {
                return Ok(());
            }
            if self.bump()?.is_none() {
                return Ok(());
            }
        }
    }

    fn finish_field(&self, field: FieldBuf) -> Result<Option<String>, RowError> {
        let to_string = |bytes: Vec<u8>| {
            String::from_utf8(bytes).map_err(|e| RowError::decode(format!("invalid UTF-8: {}", e)))
        };
        if field.enclosed {
            return to_string(field.value).map(Some);
        }
        let raw = to_string(field.raw)?;
        let value = to_string(field.value)?;
        let (raw, value) = if self.trim_space {
            (raw.trim().to_string(), value.trim().to_string())
        } else {
            (raw, value)
        };
        if self.format.is_null_token(&raw) {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    fn fail(&mut self, error: RowError) -> io::Result<Result<Option<Tokenized>, TokenizeError>> {
        self.resync()?;
        let text = String::from_utf8_lossy(&self.record).to_string();
        Ok(Err(TokenizeError { error, text }))
    }

    /// Read the next record; `Ok(Ok(None))` at end of input
    pub fn next_record(&mut self) -> io::Result<Result<Option<Tokenized>, TokenizeError>> {
        self.record.clear();
        if self.input.peek()?.is_none() {
            return Ok(Ok(None));
        }

        let mut fields: Vec<Option<String>> = Vec::new();
        let mut field = FieldBuf::default();
        let mut state = State::FieldStart;
        let mut consumed_any = false;

        loop {
            match state {
                State::FieldStart => {
                    if self.trim_space {
                        while matches!(self.input.peek()?, Some(b' ') | Some(b'\t'))
                            && self.delimiter != b'\t'
                        {
                            let b = self.bump()?;
                            if let Some(b) = b {
                                field.raw.push(b);
                                field.value.push(b);
                            }
                            consumed_any = true;
                        }
                    }
                    if let Some(q) = self.quote
                        && self.input.peek()? == Some(q)
                    {
                        self.bump()?;
                        consumed_any = true;
                        field = FieldBuf {
                            enclosed: true,
                            ..FieldBuf::default()
                        };
                        state = State::Enclosed;
                    } else {
                        state = State::Unenclosed;
                    }
                }
                State::Unenclosed => {
                    if self.take_terminator()? {
                        break;
                    }
                    let Some(b) = self.input.peek()? else {
                        break;
                    };
                    consumed_any = true;
                    if b == self.delimiter {
                        self.bump()?;
                        match self.finish_field(std::mem::take(&mut field)) {
                            Ok(v) => fields.push(v),
                            Err(e) => return self.fail(e),
                        }
                        state = State::FieldStart;
                    } else if Some(b) == self.escape_unenclosed {
                        self.bump()?;
                        field.raw.push(b);
                        match self.bump()? {
                            Some(next) => {
                                field.raw.push(next);
                                field.value.push(match next {
                                    b'n' => b'\n',
                                    b't' => b'\t',
                                    b'r' => b'\r',
                                    b'0' => 0,
                                    other => other,
                                });
                            }
                            None => field.value.push(b),
                        }
                    } else {
                        self.bump()?;
                        field.raw.push(b);
                        field.value.push(b);
                    }
                }
                State::Enclosed => {
                    let Some(b) = self.bump()? else {
                        return self.fail(RowError::decode("unterminated enclosed field"));
                    };
                    if Some(b) == self.quote {
                        if self.input.peek()? == self.quote {
                            self.bump()?;
                            field.value.push(b);
                        } else {
                            state = State::AfterEnclosure;
                        }
                    } else if Some(b) == self.escape {
                        match self.bump()? {
                            Some(next) => field.value.push(next),
                            None => {
                                return self.fail(RowError::decode("unterminated enclosed field"));
                            }
                        }
                    } else {
                        field.value.push(b);
                    }
                }
                State::AfterEnclosure => {
                    if self.take_terminator()? {
                        break;
                    }
                    match self.input.peek()? {
                        None => break,
                        Some(b) if b == self.delimiter => {
                            self.bump()?;
                            match self.finish_field(std::mem::take(&mut field)) {
                                Ok(v) => fields.push(v),
                                Err(e) => return self.fail(e),
                            }
                            state = State::FieldStart;
                        }
                        Some(b' ') | Some(b'\t') if self.trim_space => {
                            self.bump()?;
                        }
                        Some(b) => {
                            return self.fail(RowError::decode(format!(
                                "found character '{}' instead of field delimiter '{}'",
                                b as char, self.delimiter as char
                            )));
                        }
                    }
                }
            }
        }

        match self.finish_field(field) {
            Ok(v) => fields.push(v),
            Err(e) => {
                let text = String::from_utf8_lossy(&self.record).to_string();
                return Ok(Err(TokenizeError { error: e, text }));
            }
        }
        Ok(Ok(Some(Tokenized {
            fields,
            text: String::from_utf8_lossy(&self.record).to_string(),
            blank: !consumed_any,
        })))
    }
}
