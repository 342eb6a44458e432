//! Encoder from value trees to the binary format

use super::*;
use crate::error::FormatError;
use crate::mutable::MutableDict;
use crate::value::{Blob, Value};

/// Streaming encoder producing one document body.
///
/// Immutable subtrees (views, and mutable containers that were never forked)
/// are copied byte-for-byte from their backing buffer; only edited
/// containers are re-encoded.
#[derive(Debug)]
pub struct Encoder {
    buf: Vec<u8>,
}

/// Encode any value as a standalone body.
pub fn encode(value: &Value) -> Result<Vec<u8>, FormatError> {
    let mut encoder = Encoder::new();
    encoder.write_value(value)?;
    Ok(encoder.finish())
}

/// Encode a dictionary as a document body.
pub fn encode_dict(dict: &MutableDict) -> Result<Vec<u8>, FormatError> {
    encode(&Value::MutableDict(dict.clone()))
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    /// Start a new body with the format header.
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT_VERSION);
        Self { buf }
    }

    /// Append one value.
    pub fn write_value(&mut self, value: &Value) -> Result<(), FormatError> {
        match value {
            Value::Null => self.buf.push(TAG_NULL),
            Value::Bool(false) => self.buf.push(TAG_FALSE),
            Value::Bool(true) => self.buf.push(TAG_TRUE),
            Value::Int(n) => {
                self.buf.push(TAG_INT);
                self.buf.extend_from_slice(&n.to_le_bytes());
            }
            Value::Float(f) => {
                self.buf.push(TAG_FLOAT);
                self.buf.extend_from_slice(&f.to_le_bytes());
            }
            Value::String(s) => {
                self.buf.push(TAG_STRING);
                self.write_str(s)?;
            }
            Value::Blob(blob) => self.write_blob(blob)?,
            Value::Array(array) => self.write_raw(array.view())?,
            Value::Dict(dict) => self.write_raw(dict.view())?,
            Value::MutableArray(array) => match array.unforked_backing() {
                Some(backing) => self.write_raw(backing.view())?,
                None => {
                    let items = array.peek_items();
                    self.write_container(TAG_ARRAY, &items, |enc, item| enc.write_value(item))?;
                }
            },
            Value::MutableDict(dict) => match dict.unforked_backing() {
                Some(backing) => self.write_raw(backing.view())?,
                None => {
                    let mut entries = dict.peek_entries();
                    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
                    self.write_container(TAG_DICT, &entries, |enc, (key, value)| {
                        enc.write_str(key)?;
                        enc.write_value(value)
                    })?;
                }
            },
        }
        Ok(())
    }

    /// Finish and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    fn write_str(&mut self, s: &str) -> Result<(), FormatError> {
        let len = to_u32(s.len(), "string")?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn write_blob(&mut self, blob: &Blob) -> Result<(), FormatError> {
        self.buf.push(TAG_BLOB);
        self.write_str(blob.digest())?;
        self.buf.extend_from_slice(&blob.length().to_le_bytes());
        match blob.content_type() {
            Some(content_type) => {
                self.buf.push(1);
                self.write_str(content_type)?;
            }
            None => self.buf.push(0),
        }
        Ok(())
    }

    fn write_raw(&mut self, view: &ValueView) -> Result<(), FormatError> {
        let raw = view.raw().ok_or(FormatError::Truncated(view.offset()))?;
        self.buf.extend_from_slice(raw);
        Ok(())
    }

    fn write_container<T>(
        &mut self,
        tag: u8,
        items: &[T],
        mut write_item: impl FnMut(&mut Self, &T) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        let start = self.buf.len();
        self.buf.push(tag);
        self.buf
            .extend_from_slice(&to_u32(items.len(), "container")?.to_le_bytes());
        self.buf.extend_from_slice(&[0; 4]);

        let table = self.buf.len();
        self.buf.resize(table + 4 * items.len(), 0);
        for (i, item) in items.iter().enumerate() {
            let rel = to_u32(self.buf.len() - start, "container")?;
            self.buf[table + 4 * i..table + 4 * i + 4].copy_from_slice(&rel.to_le_bytes());
            write_item(self, item)?;
        }

        let size = to_u32(self.buf.len() - start, "container")?;
        self.buf[start + 5..start + 9].copy_from_slice(&size.to_le_bytes());
        Ok(())
    }
}

fn to_u32(n: usize, what: &'static str) -> Result<u32, FormatError> {
    u32::try_from(n).map_err(|_| FormatError::TooLarge(what))
}
