//! Database handle
//!
//! Owns the store, the configuration and the default conflict resolver, and
//! runs the save path: encode, conditional write, and on a stale base one
//! bounded round of conflict resolution before retrying.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collection::DictView;
use crate::config::DatabaseConfig;
use crate::conflict::{
    common_ancestor, Conflict, ConflictResolver, LastWriteWins, Resolution, UnresolvedConflict,
    UnresolvedReason,
};
use crate::document::{Document, DocumentState};
use crate::encoding::{decode, empty_dict_body, encode_dict};
use crate::error::{Error, Result, StoreError};
use crate::mutable::{Container, MutableDict};
use crate::store::{DocumentStore, MemoryStore, RevisionId, SaveOutcome, StoredRevision};

/// What one round of conflict resolution produced.
enum Resolved {
    /// The resolved body is the current revision; nothing to write
    Adopt(StoredRevision),
    /// Write this body on top of the current revision
    Retry {
        base: RevisionId,
        body: Arc<[u8]>,
        deleted: bool,
    },
}

/// A named database over a [`DocumentStore`].
///
/// # Example
///
/// ```
/// use folio::Database;
///
/// let db = Database::in_memory("people");
/// let mut doc = db.load("ann", false).unwrap();
/// doc.set("name", "Ann");
/// doc.save().unwrap();
/// assert_eq!(doc.generation(), 1);
///
/// let loaded = db.document("ann").unwrap().unwrap();
/// assert_eq!(loaded.get_as::<String>("name").unwrap().as_deref(), Some("Ann"));
/// ```
pub struct Database {
    name: String,
    store: Arc<dyn DocumentStore>,
    config: DatabaseConfig,
    conflict_resolver: Arc<dyn ConflictResolver>,
}

impl Database {
    /// Create a database over `store` with default settings.
    pub fn new(name: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: name.into(),
            store,
            config: DatabaseConfig::default(),
            conflict_resolver: Arc::new(LastWriteWins),
        }
    }

    /// A shared database over a fresh [`MemoryStore`].
    pub fn in_memory(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name, Arc::new(MemoryStore::new())))
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default conflict resolver.
    pub fn with_conflict_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.conflict_resolver = resolver;
        self
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The underlying store
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// The resolver used for documents without their own
    pub fn conflict_resolver(&self) -> Arc<dyn ConflictResolver> {
        self.conflict_resolver.clone()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════

    /// The current revision of a document, or `None` if it does not exist or
    /// has been deleted.
    pub fn document(self: &Arc<Self>, id: &str) -> Result<Option<Document>> {
        match self.store.load_current(id) {
            Ok(stored) if stored.deleted => Ok(None),
            Ok(stored) => self.open(id, stored).map(Some),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Load a document for editing.
    ///
    /// If the document does not exist (or is deleted) and `must_exist` is
    /// false, an empty document attached to this database is returned;
    /// saving it creates the document.
    pub fn load(self: &Arc<Self>, id: &str, must_exist: bool) -> Result<Document> {
        match self.store.load_current(id) {
            Ok(stored) if stored.deleted && must_exist => Err(Error::NotFound(id.to_string())),
            Ok(stored) => self.open(id, stored),
            Err(StoreError::NotFound(_)) if !must_exist => {
                let mut document = Document::new(id);
                document.attach(self.clone());
                Ok(document)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn open(self: &Arc<Self>, id: &str, stored: StoredRevision) -> Result<Document> {
        Document::loaded(
            id,
            self.clone(),
            stored.revision,
            stored.generation,
            stored.body,
            stored.deleted,
        )
    }

    /// A specific revision of a document, read-only.
    pub fn document_revision(&self, id: &str, revision: &RevisionId) -> Result<DictView> {
        let stored = self.store.load_revision(id, revision)?;
        Ok(decode(stored.body)?)
    }

    /// The most recent revision both `a` and `b` descend from, searched as
    /// deep as [`DatabaseConfig::max_ancestor_depth`] allows.
    pub fn common_ancestor(
        &self,
        id: &str,
        a: &RevisionId,
        b: &RevisionId,
    ) -> Result<Option<RevisionId>> {
        Ok(common_ancestor(
            self.store.as_ref(),
            id,
            a,
            b,
            self.config.max_ancestor_depth,
        )?)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════

    /// Save a document's properties as a new revision.
    ///
    /// An unattached document becomes attached to this database.
    pub fn save(self: &Arc<Self>, document: &mut Document) -> Result<()> {
        self.claim(document)?;
        self.install_blobs(document.properties())?;
        let body: Arc<[u8]> = document.encode()?.into();
        self.write(document, body, false)
    }

    /// Save a deletion tombstone for a document.
    pub fn delete(self: &Arc<Self>, document: &mut Document) -> Result<()> {
        self.claim(document)?;
        if !document.exists() {
            return Err(Error::NotFound(document.id().to_string()));
        }
        self.write(document, empty_dict_body().into(), true)
    }

    fn claim(self: &Arc<Self>, document: &mut Document) -> Result<()> {
        match document.database() {
            Some(owner) if !Arc::ptr_eq(owner, self) => {
                Err(Error::WrongDatabase(document.id().to_string()))
            }
            Some(_) => Ok(()),
            None => {
                document.attach(self.clone());
                Ok(())
            }
        }
    }

    /// Copy in-memory blob content into the store.
    fn install_blobs(&self, root: &MutableDict) -> Result<()> {
        let mut pending = Vec::new();
        Container::Dict(root.clone()).collect_pending_blobs(&mut pending);
        for blob in pending {
            let Some(content) = blob.pending_content() else {
                continue;
            };
            let digest = self.store.write_blob(content)?;
            if digest != blob.digest() {
                return Err(StoreError::Corrupt(format!(
                    "blob stored as {} but referenced as {}",
                    digest,
                    blob.digest()
                ))
                .into());
            }
            debug!(digest = %digest, bytes = content.len(), "installed blob");
        }
        Ok(())
    }

    fn write(&self, document: &mut Document, body: Arc<[u8]>, deleted: bool) -> Result<()> {
        let result = self.write_with_resolution(document, body, deleted);
        if let Err(err) = &result {
            warn!(document = %document.id(), error = %err, "save failed");
            document.state = DocumentState::SaveFailed;
        }
        result
    }

    fn write_with_resolution(
        &self,
        document: &mut Document,
        body: Arc<[u8]>,
        deleted: bool,
    ) -> Result<()> {
        let mut base = document.revision_id().cloned();
        let mut body = body;
        let mut deleted = deleted;
        let mut passes = 0;

        loop {
            debug!(
                document = %document.id(),
                base = %base.as_ref().map_or("none", RevisionId::as_str),
                bytes = body.len(),
                deleted,
                "submitting save"
            );
            let current = match self
                .store
                .save_if_current(document.id(), base.as_ref(), body.clone(), deleted)?
            {
                SaveOutcome::Saved {
                    revision,
                    generation,
                } => {
                    info!(document = %document.id(), %revision, generation, deleted, "saved");
                    return document.apply_saved(revision, generation, body, deleted);
                }
                SaveOutcome::Conflict { current } => current,
            };

            let stale = || Error::Conflict {
                document_id: document.id().to_string(),
                base: base
                    .as_ref()
                    .map_or_else(|| "none".to_string(), RevisionId::to_string),
            };
            let Some(current) = current else {
                return Err(stale());
            };
            if passes >= self.config.conflict_resolution_passes {
                return Err(stale());
            }
            passes += 1;
            document.state = DocumentState::ConflictPending;

            match self.resolve(document, &body, deleted, &current)? {
                Resolved::Adopt(theirs) => {
                    info!(
                        document = %document.id(),
                        revision = %theirs.revision,
                        "conflict resolved to current revision"
                    );
                    return document.apply_saved(
                        theirs.revision,
                        theirs.generation,
                        theirs.body,
                        theirs.deleted,
                    );
                }
                Resolved::Retry {
                    base: next_base,
                    body: next_body,
                    deleted: next_deleted,
                } => {
                    info!(
                        document = %document.id(),
                        base = %next_base,
                        deleted = next_deleted,
                        "conflict resolved, retrying"
                    );
                    base = Some(next_base);
                    body = next_body;
                    deleted = next_deleted;
                }
            }
        }
    }

    fn resolve(
        &self,
        document: &Document,
        mine_body: &Arc<[u8]>,
        mine_deleted: bool,
        current: &RevisionId,
    ) -> Result<Resolved> {
        let id = document.id();
        let theirs = self.store.load_revision(id, current)?;
        let mine = if mine_deleted {
            DictView::empty()
        } else {
            decode(mine_body.clone())?
        };
        let theirs_view = decode(theirs.body.clone())?;
        let mine_revision = document.revision_id().cloned();

        let unresolved = |reason: UnresolvedReason| {
            Error::NonMergeableConflict(Box::new(UnresolvedConflict {
                document_id: id.to_string(),
                mine: mine.clone(),
                theirs: theirs_view.clone(),
                mine_revision: mine_revision.clone(),
                theirs_revision: theirs.revision.clone(),
                reason,
            }))
        };

        let ancestor = match &mine_revision {
            Some(mine_revision) => self.common_ancestor(id, mine_revision, &theirs.revision)?,
            None => None,
        };
        let Some(base_revision) = ancestor else {
            return Err(unresolved(UnresolvedReason::NoCommonAncestor));
        };
        let base = self.document_revision(id, &base_revision)?;
        debug!(
            document = %id,
            base = %base_revision,
            theirs = %theirs.revision,
            "resolving conflict"
        );

        let conflict = Conflict {
            document_id: id.to_string(),
            mine: mine.clone(),
            theirs: theirs_view.clone(),
            base,
            mine_revision: mine_revision.clone(),
            theirs_revision: theirs.revision.clone(),
            base_revision,
            mine_deleted,
            theirs_deleted: theirs.deleted,
        };

        match document.effective_conflict_resolver().resolve(&conflict) {
            Resolution::Declined => Err(unresolved(UnresolvedReason::Declined)),
            Resolution::Delete if theirs.deleted => Ok(Resolved::Adopt(theirs)),
            Resolution::Delete => Ok(Resolved::Retry {
                base: theirs.revision.clone(),
                body: empty_dict_body().into(),
                deleted: true,
            }),
            Resolution::Merged(merged) => {
                self.install_blobs(&merged)?;
                let body: Arc<[u8]> = encode_dict(&merged)?.into();
                if !theirs.deleted && body == theirs.body {
                    Ok(Resolved::Adopt(theirs))
                } else {
                    Ok(Resolved::Retry {
                        base: theirs.revision.clone(),
                        body,
                        deleted: false,
                    })
                }
            }
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
