//! Lazily-navigable view over an encoded buffer

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::*;
use crate::collection::{ArrayView, DictView};
use crate::error::FormatError;
use crate::value::{Blob, Value};

/// A reference to one node inside an immutable encoded buffer.
///
/// Views never copy or mutate the buffer; cloning a view bumps the buffer's
/// atomic reference count. Every read is bounds-checked and a malformed node
/// reads as absent rather than panicking.
#[derive(Clone)]
pub struct ValueView {
    buf: Arc<[u8]>,
    pos: usize,
}

/// Validate the header of an encoded document body and return its root
/// dictionary.
pub fn decode(bytes: impl Into<Arc<[u8]>>) -> Result<DictView, FormatError> {
    let buf: Arc<[u8]> = bytes.into();
    if buf.len() < HEADER_LEN || &buf[..MAGIC.len()] != MAGIC {
        return Err(FormatError::BadHeader);
    }
    if buf[MAGIC.len()] != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(buf[MAGIC.len()]));
    }

    let root = ValueView::new(buf, HEADER_LEN);
    match root.tag() {
        Some(TAG_DICT) => {}
        Some(tag) if tag < TAG_DICT => return Err(FormatError::RootNotDictionary),
        Some(tag) => {
            return Err(FormatError::UnknownTag {
                tag,
                offset: HEADER_LEN,
            })
        }
        None => return Err(FormatError::Truncated(HEADER_LEN)),
    }
    root.byte_len().ok_or(FormatError::Truncated(HEADER_LEN))?;
    Ok(DictView::from_view(root))
}

impl ValueView {
    pub(crate) fn new(buf: Arc<[u8]>, pos: usize) -> Self {
        Self { buf, pos }
    }

    /// The shared buffer this view points into
    pub fn buffer(&self) -> &Arc<[u8]> {
        &self.buf
    }

    /// Byte offset of this node within the buffer
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// True when both views address the same node of the same buffer.
    pub fn same_node(&self, other: &ValueView) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf) && self.pos == other.pos
    }

    pub(crate) fn tag(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Primitive Reads
    // ═══════════════════════════════════════════════════════════════════

    fn bytes_at(&self, at: usize, len: usize) -> Option<&[u8]> {
        self.buf.get(at..at.checked_add(len)?)
    }

    fn u32_at(&self, at: usize) -> Option<usize> {
        let bytes = self.bytes_at(at, 4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?) as usize)
    }

    fn u64_at(&self, at: usize) -> Option<u64> {
        let bytes = self.bytes_at(at, 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Read a length-prefixed string, returning it and the offset after it.
    fn str_at(&self, at: usize) -> Option<(&str, usize)> {
        let len = self.u32_at(at)?;
        let bytes = self.bytes_at(at + 4, len)?;
        let s = std::str::from_utf8(bytes).ok()?;
        Some((s, at + 4 + len))
    }

    /// Total encoded size of this node, if it fits in the buffer.
    pub fn byte_len(&self) -> Option<usize> {
        let pos = self.pos;
        let len = match self.tag()? {
            TAG_NULL | TAG_FALSE | TAG_TRUE => 1,
            TAG_INT | TAG_FLOAT => 9,
            TAG_STRING => 5 + self.u32_at(pos + 1)?,
            TAG_BLOB => {
                let (_, after_digest) = self.str_at(pos + 1)?;
                let flag_at = after_digest + 8;
                let end = match *self.buf.get(flag_at)? {
                    0 => flag_at + 1,
                    _ => self.str_at(flag_at + 1)?.1,
                };
                end - pos
            }
            TAG_ARRAY | TAG_DICT => self.u32_at(pos + 5)?,
            _ => return None,
        };
        (pos.checked_add(len)? <= self.buf.len()).then_some(len)
    }

    /// The raw bytes of this node.
    pub fn raw(&self) -> Option<&[u8]> {
        let len = self.byte_len()?;
        self.buf.get(self.pos..self.pos + len)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Conversion
    // ═══════════════════════════════════════════════════════════════════

    /// Read this node as a value. Containers come back as views sharing the
    /// buffer; scalars are copied out.
    pub fn to_value(&self) -> Option<Value> {
        let pos = self.pos;
        let value = match self.tag()? {
            TAG_NULL => Value::Null,
            TAG_FALSE => Value::Bool(false),
            TAG_TRUE => Value::Bool(true),
            TAG_INT => Value::Int(i64::from_le_bytes(self.bytes_at(pos + 1, 8)?.try_into().ok()?)),
            TAG_FLOAT => {
                Value::Float(f64::from_le_bytes(self.bytes_at(pos + 1, 8)?.try_into().ok()?))
            }
            TAG_STRING => Value::string(self.str_at(pos + 1)?.0),
            TAG_BLOB => {
                let (digest, after_digest) = self.str_at(pos + 1)?;
                let length = self.u64_at(after_digest)?;
                let content_type = match *self.buf.get(after_digest + 8)? {
                    0 => None,
                    _ => Some(self.str_at(after_digest + 9)?.0.to_string()),
                };
                Value::Blob(Blob::from_metadata(digest, length, content_type))
            }
            TAG_ARRAY => {
                self.byte_len()?;
                Value::Array(ArrayView::from_view(self.clone()))
            }
            TAG_DICT => {
                self.byte_len()?;
                Value::Dict(DictView::from_view(self.clone()))
            }
            _ => return None,
        };
        Some(value)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Container Navigation
    // ═══════════════════════════════════════════════════════════════════

    /// Number of items (arrays) or entries (dictionaries); zero otherwise.
    pub fn count(&self) -> usize {
        match self.tag() {
            Some(TAG_ARRAY) | Some(TAG_DICT) => self.u32_at(self.pos + 1).unwrap_or(0),
            _ => 0,
        }
    }

    /// Absolute position of child `index`, validated against the node size.
    ///
    /// Children must start after the offset table, so every child lies
    /// strictly inside its parent and navigation always moves forward.
    fn child_pos(&self, index: usize) -> Option<usize> {
        let count = self.count();
        if index >= count {
            return None;
        }
        let size = self.u32_at(self.pos + 5)?;
        let table_end = count.checked_mul(4)?.checked_add(CONTAINER_HEADER_LEN)?;
        let rel = self.u32_at(self.pos + CONTAINER_HEADER_LEN + 4 * index)?;
        (rel >= table_end && rel < size).then_some(self.pos + rel)
    }

    /// Item `index` of an array node.
    pub fn array_get(&self, index: usize) -> Option<ValueView> {
        if self.tag()? != TAG_ARRAY {
            return None;
        }
        Some(ValueView::new(self.buf.clone(), self.child_pos(index)?))
    }

    /// Entry `index` (in key order) of a dictionary node.
    pub fn dict_entry(&self, index: usize) -> Option<(&str, ValueView)> {
        if self.tag()? != TAG_DICT {
            return None;
        }
        let (key, value_pos) = self.str_at(self.child_pos(index)?)?;
        Some((key, ValueView::new(self.buf.clone(), value_pos)))
    }

    /// Look up `key` in a dictionary node by binary search.
    pub fn dict_get(&self, key: &str) -> Option<ValueView> {
        if self.tag()? != TAG_DICT {
            return None;
        }
        let (mut lo, mut hi) = (0, self.count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (k, _) = self.str_at(self.child_pos(mid)?)?;
            match k.as_bytes().cmp(key.as_bytes()) {
                Ordering::Equal => return self.dict_entry(mid).map(|(_, v)| v),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        None
    }
}

impl fmt::Debug for ValueView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueView")
            .field("offset", &self.pos)
            .field("tag", &self.tag())
            .field("buffer_len", &self.buf.len())
            .finish()
    }
}
