//! Native store boundary
//!
//! The document model reaches persistent storage only through
//! [`DocumentStore`]: current and historical revisions, a conditional write,
//! the ancestor chain of a revision, and blob content by digest.
//! [`MemoryStore`] is the reference implementation.

mod memory;

pub use memory::{MemoryStore, DEFAULT_MAX_REVISION_HISTORY};

use std::fmt;
use std::sync::Arc;

use sha1::{Digest, Sha1};

use crate::error::StoreError;

/// Opaque revision token: `"<generation>-<hex digest>"`.
///
/// Only equality is meaningful. The textual form is used as a stable
/// tie-breaker, never as an ordering of history.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RevisionId(Arc<str>);

impl RevisionId {
    /// Wrap an existing token.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Derive the id of a new revision from its parent, deletion flag and body.
    pub fn compute(
        generation: u64,
        parent: Option<&RevisionId>,
        deleted: bool,
        body: &[u8],
    ) -> Self {
        let mut hasher = Sha1::new();
        if let Some(parent) = parent {
            hasher.update(parent.as_str().as_bytes());
        }
        hasher.update([deleted as u8]);
        hasher.update(body);
        Self::new(format!("{}-{}", generation, hex::encode(hasher.finalize())))
    }

    /// The token text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generation prefix, if the token has the standard shape
    pub fn generation(&self) -> Option<u64> {
        self.0.split_once('-')?.0.parse().ok()
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", self.0)
    }
}

/// One stored revision of a document.
#[derive(Clone, Debug)]
pub struct StoredRevision {
    /// Revision token
    pub revision: RevisionId,
    /// Number of saves in this revision's lineage
    pub generation: u64,
    /// Encoded body
    pub body: Arc<[u8]>,
    /// True for a deletion tombstone
    pub deleted: bool,
}

/// Result of [`DocumentStore::save_if_current`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The write went through
    Saved {
        /// New current revision
        revision: RevisionId,
        /// Its generation
        generation: u64,
    },
    /// The base revision was not current; nothing was written
    Conflict {
        /// The revision that is current (`None` if the document does not exist)
        current: Option<RevisionId>,
    },
}

/// CRUD and revision-history primitives of a persistent store.
///
/// Implementations must make `save_if_current` atomic per document: the
/// comparison against the current revision and the write happen as one step.
pub trait DocumentStore: Send + Sync {
    /// Current revision of a document. A deleted document still has a
    /// current revision (its tombstone); a document that never existed is
    /// [`StoreError::NotFound`].
    fn load_current(&self, document_id: &str) -> Result<StoredRevision, StoreError>;

    /// A specific revision, if still retained.
    fn load_revision(
        &self,
        document_id: &str,
        revision: &RevisionId,
    ) -> Result<StoredRevision, StoreError>;

    /// Write `body` as the next revision if `base` is the current revision.
    ///
    /// `base` is `None` for a new document; that also succeeds when the
    /// current revision is a tombstone, continuing the same lineage.
    fn save_if_current(
        &self,
        document_id: &str,
        base: Option<&RevisionId>,
        body: Arc<[u8]>,
        deleted: bool,
    ) -> Result<SaveOutcome, StoreError>;

    /// Retained ancestors of `revision`, most recent first, excluding
    /// `revision` itself.
    fn ancestors_of(
        &self,
        document_id: &str,
        revision: &RevisionId,
    ) -> Result<Vec<RevisionId>, StoreError>;

    /// Store blob content, returning its digest.
    fn write_blob(&self, content: &[u8]) -> Result<String, StoreError>;

    /// Read blob content by digest.
    fn read_blob(&self, digest: &str) -> Result<Arc<[u8]>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_id_shape() {
        let first = RevisionId::compute(1, None, false, b"body");
        assert_eq!(first.generation(), Some(1));
        assert_eq!(first.as_str().len(), 2 + 40);

        let second = RevisionId::compute(2, Some(&first), false, b"body");
        assert_eq!(second.generation(), Some(2));
        assert_ne!(first.as_str()[2..], second.as_str()[2..]);
    }

    #[test]
    fn test_revision_id_depends_on_deletion() {
        let live = RevisionId::compute(3, None, false, b"x");
        let dead = RevisionId::compute(3, None, true, b"x");
        assert_ne!(live, dead);
        assert_eq!(live, RevisionId::compute(3, None, false, b"x"));
    }
}
