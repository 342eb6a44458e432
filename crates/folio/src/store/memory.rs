//! In-memory document store

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::trace;

use super::{DocumentStore, RevisionId, SaveOutcome, StoredRevision};
use crate::error::StoreError;
use crate::value::Blob;

/// Revisions kept per document unless configured otherwise.
pub const DEFAULT_MAX_REVISION_HISTORY: usize = 20;

struct RevisionEntry {
    generation: u64,
    parent: Option<RevisionId>,
    body: Arc<[u8]>,
    deleted: bool,
}

struct DocumentHistory {
    current: RevisionId,
    /// Oldest first; the current revision is always the last entry.
    revisions: IndexMap<RevisionId, RevisionEntry>,
}

impl DocumentHistory {
    fn stored(&self, revision: &RevisionId) -> Option<StoredRevision> {
        self.revisions.get(revision).map(|entry| StoredRevision {
            revision: revision.clone(),
            generation: entry.generation,
            body: entry.body.clone(),
            deleted: entry.deleted,
        })
    }

    fn push(&mut self, revision: RevisionId, entry: RevisionEntry, max_history: usize) {
        self.revisions.insert(revision.clone(), entry);
        self.current = revision;
        while self.revisions.len() > max_history {
            if let Some((pruned, _)) = self.revisions.shift_remove_index(0) {
                trace!(revision = %pruned, "pruned revision");
            }
        }
    }
}

/// A [`DocumentStore`] held entirely in memory.
///
/// Each document keeps a bounded history of revisions; the oldest are pruned
/// first and the current revision is never pruned. Safe to share between
/// threads.
pub struct MemoryStore {
    documents: DashMap<String, DocumentHistory>,
    blobs: DashMap<String, Arc<[u8]>>,
    max_revision_history: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            blobs: DashMap::new(),
            max_revision_history: DEFAULT_MAX_REVISION_HISTORY,
        }
    }

    /// Set how many revisions are kept per document (at least one).
    pub fn with_max_revision_history(mut self, max: usize) -> Self {
        self.max_revision_history = max.max(1);
        self
    }

    /// Number of documents, deleted ones included
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Number of revisions currently retained for a document
    pub fn revision_count(&self, document_id: &str) -> usize {
        self.documents
            .get(document_id)
            .map_or(0, |history| history.revisions.len())
    }
}

impl DocumentStore for MemoryStore {
    fn load_current(&self, document_id: &str) -> Result<StoredRevision, StoreError> {
        let history = self
            .documents
            .get(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        history
            .stored(&history.current)
            .ok_or_else(|| missing_current(document_id))
    }

    fn load_revision(
        &self,
        document_id: &str,
        revision: &RevisionId,
    ) -> Result<StoredRevision, StoreError> {
        self.documents
            .get(document_id)
            .and_then(|history| history.stored(revision))
            .ok_or_else(|| StoreError::NotFound(format!("{} revision {}", document_id, revision)))
    }

    fn save_if_current(
        &self,
        document_id: &str,
        base: Option<&RevisionId>,
        body: Arc<[u8]>,
        deleted: bool,
    ) -> Result<SaveOutcome, StoreError> {
        match self.documents.entry(document_id.to_string()) {
            Entry::Vacant(vacant) => {
                if base.is_some() {
                    return Ok(SaveOutcome::Conflict { current: None });
                }
                let revision = RevisionId::compute(1, None, deleted, &body);
                let mut revisions = IndexMap::new();
                revisions.insert(
                    revision.clone(),
                    RevisionEntry {
                        generation: 1,
                        parent: None,
                        body,
                        deleted,
                    },
                );
                vacant.insert(DocumentHistory {
                    current: revision.clone(),
                    revisions,
                });
                Ok(SaveOutcome::Saved {
                    revision,
                    generation: 1,
                })
            }
            Entry::Occupied(mut occupied) => {
                let history = occupied.get_mut();
                let current = history
                    .revisions
                    .get(&history.current)
                    .ok_or_else(|| missing_current(document_id))?;
                let accepted = match base {
                    Some(base) => *base == history.current,
                    None => current.deleted,
                };
                if !accepted {
                    return Ok(SaveOutcome::Conflict {
                        current: Some(history.current.clone()),
                    });
                }
                let generation = current.generation + 1;
                let parent = history.current.clone();
                let revision = RevisionId::compute(generation, Some(&parent), deleted, &body);
                history.push(
                    revision.clone(),
                    RevisionEntry {
                        generation,
                        parent: Some(parent),
                        body,
                        deleted,
                    },
                    self.max_revision_history,
                );
                Ok(SaveOutcome::Saved { revision, generation })
            }
        }
    }

    fn ancestors_of(
        &self,
        document_id: &str,
        revision: &RevisionId,
    ) -> Result<Vec<RevisionId>, StoreError> {
        let history = self
            .documents
            .get(document_id)
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))?;
        let mut entry = history
            .revisions
            .get(revision)
            .ok_or_else(|| StoreError::NotFound(format!("{} revision {}", document_id, revision)))?;

        let mut ancestors = Vec::new();
        while let Some(parent) = &entry.parent {
            let Some(next) = history.revisions.get(parent) else {
                break;
            };
            ancestors.push(parent.clone());
            entry = next;
        }
        Ok(ancestors)
    }

    fn write_blob(&self, content: &[u8]) -> Result<String, StoreError> {
        let digest = Blob::digest_of(content);
        self.blobs
            .entry(digest.clone())
            .or_insert_with(|| Arc::from(content));
        Ok(digest)
    }

    fn read_blob(&self, digest: &str) -> Result<Arc<[u8]>, StoreError> {
        self.blobs
            .get(digest)
            .map(|content| content.clone())
            .ok_or_else(|| StoreError::NotFound(format!("blob {}", digest)))
    }
}

fn missing_current(document_id: &str) -> StoreError {
    StoreError::Corrupt(format!("current revision of {} is missing", document_id))
}
