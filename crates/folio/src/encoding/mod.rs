//! Compact binary encoding of value trees
//!
//! Document bodies are stored as a single immutable buffer that can be
//! navigated in place: containers carry an offset table so that reading one
//! array item or one dictionary key never decodes its siblings.
//!
//! ## Layout
//!
//! ```text
//! header      "FOLI" version:u8
//! null/bool   tag
//! int/float   tag  payload:8 (little-endian)
//! string      tag  len:u32  utf8[len]
//! blob        tag  digest:str  length:u64  has_type:u8  [content_type:str]
//! array       tag  count:u32  size:u32  offsets:u32[count]  items...
//! dict        tag  count:u32  size:u32  offsets:u32[count]  (key:str value)...
//! ```
//!
//! Offsets are relative to the start of their container node and `size`
//! covers the whole node, so an unmodified subtree can be copied into a new
//! buffer byte-for-byte. Dictionary entries are sorted by the UTF-8 bytes of
//! their keys; lookups binary-search the offset table.

mod encoder;
mod view;

pub use encoder::{encode, encode_dict, Encoder};
pub use view::{decode, ValueView};

pub(crate) const MAGIC: &[u8; 4] = b"FOLI";
pub(crate) const FORMAT_VERSION: u8 = 1;
pub(crate) const HEADER_LEN: usize = MAGIC.len() + 1;

pub(crate) const TAG_NULL: u8 = 0x00;
pub(crate) const TAG_FALSE: u8 = 0x01;
pub(crate) const TAG_TRUE: u8 = 0x02;
pub(crate) const TAG_INT: u8 = 0x03;
pub(crate) const TAG_FLOAT: u8 = 0x04;
pub(crate) const TAG_STRING: u8 = 0x05;
pub(crate) const TAG_BLOB: u8 = 0x06;
pub(crate) const TAG_ARRAY: u8 = 0x07;
pub(crate) const TAG_DICT: u8 = 0x08;

/// Bytes before a container's offset table: tag, count, size.
pub(crate) const CONTAINER_HEADER_LEN: usize = 9;

/// The body of an empty dictionary; also the body of a deletion tombstone.
pub(crate) fn empty_dict_body() -> Vec<u8> {
    let mut body = Vec::with_capacity(HEADER_LEN + CONTAINER_HEADER_LEN);
    body.extend_from_slice(MAGIC);
    body.push(FORMAT_VERSION);
    body.push(TAG_DICT);
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&(CONTAINER_HEADER_LEN as u32).to_le_bytes());
    body
}
