//! JSON document reader
//!
//! Accepts a single document, concatenated or newline-delimited documents, and
//! (with `strip_outer_array`) a top-level array whose elements become rows.

use std::collections::VecDeque;
use std::io::{BufReader, Read};

use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer, Value as JsonValue};

type DocumentStream =
    StreamDeserializer<'static, IoRead<BufReader<Box<dyn Read + Send>>>, JsonValue>;

pub(crate) struct JsonDocuments {
    stream: DocumentStream,
    pending: VecDeque<JsonValue>,
    strip_outer_array: bool,
    done: bool,
}

impl JsonDocuments {
    pub fn new(reader: Box<dyn Read + Send>, strip_outer_array: bool) -> Self {
        Self {
            stream: Deserializer::from_reader(BufReader::new(reader)).into_iter::<JsonValue>(),
            pending: VecDeque::new(),
            strip_outer_array,
            done: false,
        }
    }
}

impl Iterator for JsonDocuments {
    /// A document, or the parse error that ended the file
    type Item = Result<JsonValue, String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.pending.pop_front() {
                return Some(Ok(doc));
            }
            if self.done {
                return None;
            }
            match self.stream.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    // Stream position is lost after a syntax error
                    self.done = true;
                    return Some(Err(e.to_string()));
                }
                Some(Ok(JsonValue::Array(items))) if self.strip_outer_array => {
                    self.pending.extend(items);
                }
                Some(Ok(doc)) => return Some(Ok(doc)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn docs(input: &str, strip: bool) -> Vec<Result<JsonValue, String>> {
        JsonDocuments::new(Box::new(Cursor::new(input.as_bytes().to_vec())), strip).collect()
    }

    #[test]
    fn reads_newline_delimited_documents() {
        let out = docs("{\"a\":1}\n{\"a\":2}\n", false);
        assert_eq!(out, vec![Ok(json!({"a": 1})), Ok(json!({"a": 2}))]);
    }

    #[test]
    fn strips_outer_array() {
        let out = docs("[{\"a\":1},{\"a\":2}]", true);
        assert_eq!(out.len(), 2);
        let kept = docs("[{\"a\":1},{\"a\":2}]", false);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn malformed_document_ends_the_file() {
        let out = docs("{\"a\":1}\n{\"a\": oops}\n{\"a\":3}\n", false);
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }
}
