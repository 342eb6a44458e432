//! Error types for document access, encoding and persistence

use thiserror::Error;

use crate::conflict::UnresolvedConflict;
use crate::value::Value;

/// Main error type for folio operations.
///
/// Navigation never produces an error: missing keys, out-of-range reads and
/// speculative paths through absent containers resolve to empty values.
/// Only write-path violations, coercions to an incompatible native type and
/// persistence failures surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// Document or revision absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// The revision a save targeted is no longer current, and resolution
    /// could not be retried
    #[error("Conflict: revision {base} of document {document_id} is no longer current")]
    Conflict {
        /// Document being saved
        document_id: String,
        /// Revision the save was based on (`none` for a new document)
        base: String,
    },

    /// Write through a path segment that does not resolve to a container
    #[error("Path not settable: {0}")]
    PathNotSettable(String),

    /// Reading a value as an incompatible native type
    #[error("Type error: expected {expected}, got {got}")]
    TypeMismatch {
        /// Requested type
        expected: &'static str,
        /// Actual type of the stored value
        got: &'static str,
    },

    /// Array write outside the valid index range
    #[error("Index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Array length at the time of the call
        len: usize,
    },

    /// Conflict the resolver could not (or would not) merge
    #[error("Unresolved conflict on document {}: {}", .0.document_id, .0.reason)]
    NonMergeableConflict(Box<UnresolvedConflict>),

    /// Save or delete on a document with no owning database
    #[error("Document {0} is not attached to a database")]
    NotAttached(String),

    /// Save or delete through a database the document was not loaded from
    #[error("Document {0} belongs to a different database")]
    WrongDatabase(String),

    /// Malformed or oversized encoded data
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Store-boundary failure, passed through unmodified
    #[error("Store error: {0}")]
    Store(StoreError),
}

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Requested document, revision or blob does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored data is inconsistent
    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    /// Any other backend failure (I/O, transaction aborts, ...)
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Error::NotFound(what),
            other => Error::Store(other),
        }
    }
}

/// Errors in the binary value encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Buffer does not start with the expected magic bytes
    #[error("missing or invalid header")]
    BadHeader,

    /// Buffer was written by an unknown format version
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    /// A node extends past the end of the buffer
    #[error("truncated data at offset {0}")]
    Truncated(usize),

    /// A node starts with a tag this version does not know
    #[error("unknown tag {tag:#04x} at offset {offset}")]
    UnknownTag {
        /// The tag byte
        tag: u8,
        /// Position of the node
        offset: usize,
    },

    /// The root of a document body must be a dictionary
    #[error("root value is not a dictionary")]
    RootNotDictionary,

    /// A string, container or body exceeds the 32-bit size fields
    #[error("{0} exceeds the maximum encodable size")]
    TooLarge(&'static str),
}

/// Result type alias for folio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Get a human-readable type name for a value.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "integer",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Blob(_) => "blob",
        Value::Array(_) | Value::MutableArray(_) => "array",
        Value::Dict(_) | Value::MutableDict(_) => "dictionary",
    }
}
