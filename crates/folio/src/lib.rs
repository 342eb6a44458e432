//! # Folio
//!
//! The document data model of an embedded document database client.
//!
//! Document bodies are stored as immutable, navigable binary buffers. Reading
//! one yields lightweight views that share the buffer; editing promotes them
//! to copy-on-write containers that fork only the nodes actually written,
//! and mark their ancestors changed through weak parent links. Saving writes
//! a new revision conditionally on the old one still being current; when it
//! is not, a pluggable resolver merges against the common ancestor.
//!
//! ## Architecture
//!
//! - **Encoding**: compact binary format, navigable in place
//! - **Views**: [`DictView`] / [`ArrayView`], read-only and thread-safe
//! - **Mutable containers**: [`MutableDict`] / [`MutableArray`], copy-on-write
//! - **Fragments**: speculative, non-vivifying path access
//! - **Documents**: identity, revision, generation and an editable root
//! - **Conflicts**: common-ancestor search and [`ConflictResolver`] policies
//! - **Store**: the [`DocumentStore`] boundary and an in-memory [`MemoryStore`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod config;
pub mod conflict;
pub mod database;
pub mod document;
pub mod encoding;
pub mod error;
pub mod fragment;
pub mod mutable;
pub mod store;
pub mod value;

// Re-export main types
pub use collection::{ArrayView, DictView};
pub use config::DatabaseConfig;
pub use conflict::{
    Conflict, ConflictResolver, LastWriteWins, Resolution, UnresolvedConflict, UnresolvedReason,
};
pub use database::Database;
pub use document::{Document, DocumentState};
pub use error::{Error, FormatError, Result, StoreError};
pub use fragment::{Fragment, MutableFragment, PathSegment};
pub use mutable::{Container, MutableArray, MutableDict};
pub use store::{DocumentStore, MemoryStore, RevisionId, SaveOutcome, StoredRevision};
pub use value::{Blob, FromValue, Value};

/// Folio version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_views_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DictView>();
        assert_send_sync::<ArrayView>();
        assert_send_sync::<Database>();
        assert_send_sync::<MemoryStore>();
    }
}
