//! Conflict resolution
//!
//! A save whose base revision is no longer current produces a [`Conflict`]:
//! the edited body (*mine*), the current stored body (*theirs*) and the body
//! of their most recent common revision (*base*), all as read-only
//! snapshots. A [`ConflictResolver`] turns that into a [`Resolution`]; the
//! database then retries the save on top of *theirs*.

use std::collections::HashSet;
use std::fmt;

use tracing::trace;

use crate::collection::DictView;
use crate::error::StoreError;
use crate::mutable::MutableDict;
use crate::store::{DocumentStore, RevisionId};

/// Inputs to a conflict resolver. All three bodies are immutable.
#[derive(Clone, Debug)]
pub struct Conflict {
    /// Document being saved
    pub document_id: String,
    /// The rejected body
    pub mine: DictView,
    /// The current stored body
    pub theirs: DictView,
    /// The common ancestor's body
    pub base: DictView,
    /// Revision `mine` was edited from; `None` for a document never saved
    pub mine_revision: Option<RevisionId>,
    /// The current revision
    pub theirs_revision: RevisionId,
    /// The common ancestor
    pub base_revision: RevisionId,
    /// True if the rejected save was a deletion
    pub mine_deleted: bool,
    /// True if the current revision is a tombstone
    pub theirs_deleted: bool,
}

/// What a resolver decided.
#[derive(Debug)]
pub enum Resolution {
    /// Save this body on top of the current revision
    Merged(MutableDict),
    /// Save a deletion on top of the current revision
    Delete,
    /// Do not merge; the save fails with the conflict attached
    Declined,
}

/// Pluggable merge policy.
///
/// Implementations must not depend on anything but their inputs, so that a
/// conflict resolves the same way on every retry and in every process.
/// Closures of the right shape implement this trait.
pub trait ConflictResolver: Send + Sync {
    /// Decide how to resolve `conflict`.
    fn resolve(&self, conflict: &Conflict) -> Resolution;
}

impl<F> ConflictResolver for F
where
    F: Fn(&Conflict) -> Resolution + Send + Sync,
{
    fn resolve(&self, conflict: &Conflict) -> Resolution {
        self(conflict)
    }
}

/// The default policy: one side wins outright.
///
/// The side with the shorter encoded body wins. Equal lengths fall back to
/// the lexicographically greater revision id (a never-saved *mine* counts
/// as the empty string). Tombstones encode to the shortest possible body, so
/// deletions win against any non-empty document. The rule is arbitrary but
/// depends only on bytes and ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct LastWriteWins;

impl LastWriteWins {
    /// True if `mine` wins against `theirs`.
    pub fn mine_wins(conflict: &Conflict) -> bool {
        let mine_len = if conflict.mine_deleted { 0 } else { conflict.mine.encoded_len() };
        let theirs_len = if conflict.theirs_deleted { 0 } else { conflict.theirs.encoded_len() };
        if mine_len != theirs_len {
            return mine_len < theirs_len;
        }
        let mine_rev = conflict.mine_revision.as_ref().map_or("", RevisionId::as_str);
        mine_rev > conflict.theirs_revision.as_str()
    }
}

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, conflict: &Conflict) -> Resolution {
        let (body, deleted) = if Self::mine_wins(conflict) {
            (&conflict.mine, conflict.mine_deleted)
        } else {
            (&conflict.theirs, conflict.theirs_deleted)
        };
        if deleted {
            Resolution::Delete
        } else {
            Resolution::Merged(body.to_mutable())
        }
    }
}

/// Why a conflict was surfaced to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The histories share no retained revision
    NoCommonAncestor,
    /// The resolver declined to merge
    Declined,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NoCommonAncestor => {
                write!(f, "no common ancestor within the retained history")
            }
            UnresolvedReason::Declined => write!(f, "resolver declined to merge"),
        }
    }
}

/// A conflict that was not merged, carrying both sides for a manual merge.
#[derive(Clone, Debug)]
pub struct UnresolvedConflict {
    /// Document that failed to save
    pub document_id: String,
    /// The rejected body
    pub mine: DictView,
    /// The current stored body
    pub theirs: DictView,
    /// Revision `mine` was edited from
    pub mine_revision: Option<RevisionId>,
    /// The current revision
    pub theirs_revision: RevisionId,
    /// Why it was not merged
    pub reason: UnresolvedReason,
}

/// `revision` followed by its retained ancestors, at most `max_depth` long.
fn lineage(
    store: &dyn DocumentStore,
    document_id: &str,
    revision: &RevisionId,
    max_depth: usize,
) -> Result<Vec<RevisionId>, StoreError> {
    let mut chain = vec![revision.clone()];
    match store.ancestors_of(document_id, revision) {
        Ok(ancestors) => chain.extend(ancestors),
        Err(StoreError::NotFound(_)) => {}
        Err(err) => return Err(err),
    }
    chain.truncate(max_depth.max(1));
    Ok(chain)
}

/// The most recent revision present in both histories.
///
/// Each side is searched at most `max_depth` revisions deep, counting the
/// revision itself. The first revision of `mine`'s lineage that also
/// appears in `theirs`' lineage is the common ancestor.
pub fn common_ancestor(
    store: &dyn DocumentStore,
    document_id: &str,
    mine: &RevisionId,
    theirs: &RevisionId,
    max_depth: usize,
) -> Result<Option<RevisionId>, StoreError> {
    let theirs_lineage = lineage(store, document_id, theirs, max_depth)?;
    let theirs_set: HashSet<&RevisionId> = theirs_lineage.iter().collect();
    let found = lineage(store, document_id, mine, max_depth)?
        .into_iter()
        .find(|revision| theirs_set.contains(revision));
    trace!(%mine, %theirs, ancestor = ?found, "common ancestor search");
    Ok(found)
}
