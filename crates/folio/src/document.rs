//! Documents
//!
//! A [`Document`] pairs an id and a revision with an editable root
//! dictionary. Reads and edits touch only the in-memory tree; `save` and
//! `delete` go through the owning [`Database`].

use std::fmt;
use std::sync::Arc;

use crate::collection::DictView;
use crate::conflict::{ConflictResolver, LastWriteWins};
use crate::database::Database;
use crate::encoding::{decode, encode_dict};
use crate::error::{Error, Result};
use crate::fragment::MutableFragment;
use crate::mutable::MutableDict;
use crate::store::RevisionId;
use crate::value::{FromValue, Value};

/// Where a document is in its save lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentState {
    /// Never saved
    Unsaved,
    /// In step with the revision it was last saved as or loaded from
    Saved,
    /// A save was rejected and the resolver is running.
    ///
    /// Only held inside [`Database::save`](crate::Database::save) or
    /// [`Database::delete`](crate::Database::delete): by the time either
    /// returns, the document is `Saved` or `SaveFailed`.
    ConflictPending,
    /// The last save failed; the edits are still in memory
    SaveFailed,
}

/// A document: identity, revision and an editable root dictionary.
///
/// Not thread-safe: the root is a single-owner mutable tree.
pub struct Document {
    id: String,
    database: Option<Arc<Database>>,
    revision: Option<RevisionId>,
    generation: u64,
    deleted: bool,
    pub(crate) state: DocumentState,
    root: MutableDict,
    conflict_resolver: Option<Arc<dyn ConflictResolver>>,
}

impl Document {
    /// Create a new, unsaved document with no database.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            database: None,
            revision: None,
            generation: 0,
            deleted: false,
            state: DocumentState::Unsaved,
            root: MutableDict::new(),
            conflict_resolver: None,
        }
    }

    /// Create an unsaved document with initial properties.
    pub fn with_properties(id: impl Into<String>, properties: MutableDict) -> Self {
        Self {
            root: properties,
            ..Self::new(id)
        }
    }

    pub(crate) fn loaded(
        id: &str,
        database: Arc<Database>,
        revision: RevisionId,
        generation: u64,
        body: Arc<[u8]>,
        deleted: bool,
    ) -> Result<Self> {
        let mut document = Self::new(id);
        document.database = Some(database);
        document.apply_saved(revision, generation, body, deleted)?;
        Ok(document)
    }

    /// Take on a stored revision as the new baseline.
    pub(crate) fn apply_saved(
        &mut self,
        revision: RevisionId,
        generation: u64,
        body: Arc<[u8]>,
        deleted: bool,
    ) -> Result<()> {
        self.root = decode(body)?.to_mutable();
        self.revision = Some(revision);
        self.generation = generation;
        self.deleted = deleted;
        self.state = DocumentState::Saved;
        Ok(())
    }

    pub(crate) fn attach(&mut self, database: Arc<Database>) {
        self.database = Some(database);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Identity and State
    // ═══════════════════════════════════════════════════════════════════

    /// Document id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The revision this document was loaded from or last saved as
    pub fn revision_id(&self) -> Option<&RevisionId> {
        self.revision.as_ref()
    }

    /// Number of saves in this document's lineage; 0 before the first save
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if a live (non-deleted) revision has been saved
    pub fn exists(&self) -> bool {
        self.revision.is_some() && !self.deleted
    }

    /// True if the current revision is a deletion tombstone
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Lifecycle state
    pub fn state(&self) -> DocumentState {
        self.state
    }

    /// The owning database, if attached
    pub fn database(&self) -> Option<&Arc<Database>> {
        self.database.as_ref()
    }

    /// True if the properties were edited since the last load or save
    pub fn is_changed(&self) -> bool {
        self.root.is_changed()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Properties
    // ═══════════════════════════════════════════════════════════════════

    /// The editable root dictionary
    pub fn properties(&self) -> &MutableDict {
        &self.root
    }

    /// Read-only snapshot of the current properties
    pub fn snapshot(&self) -> Result<DictView> {
        self.root.snapshot()
    }

    /// Look up a property
    pub fn get(&self, key: &str) -> Option<Value> {
        self.root.get(key)
    }

    /// Look up a property as a native type
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<Option<T>> {
        self.root.get_as(key)
    }

    /// Set a property
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.root.set(key, value);
    }

    /// Remove a property
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.root.remove(key)
    }

    /// Check whether a property is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.root.contains_key(key)
    }

    /// Number of top-level properties
    pub fn count(&self) -> usize {
        self.root.count()
    }

    /// Property names
    pub fn keys(&self) -> Vec<String> {
        self.root.keys()
    }

    /// Start a settable path at a top-level property.
    pub fn fragment<'a>(&self, key: &'a str) -> MutableFragment<'a> {
        self.root.fragment(key)
    }

    /// Encode the current properties.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(encode_dict(&self.root)?)
    }

    /// Project the properties onto a plain `serde_json` tree.
    pub fn to_json(&self) -> serde_json::Value {
        self.root.to_json()
    }

    /// An independent copy of this document. Unedited data stays shared
    /// with the original until either side writes to it.
    pub fn to_mutable(&self) -> Document {
        Document {
            id: self.id.clone(),
            database: self.database.clone(),
            revision: self.revision.clone(),
            generation: self.generation,
            deleted: self.deleted,
            state: self.state,
            root: self.root.deep_copy(),
            conflict_resolver: self.conflict_resolver.clone(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════════════

    /// Override the database's conflict resolver for this document.
    pub fn set_conflict_resolver(&mut self, resolver: Option<Arc<dyn ConflictResolver>>) {
        self.conflict_resolver = resolver;
    }

    /// The resolver used when a save of this document conflicts: its own,
    /// else the database's, else [`LastWriteWins`].
    pub fn effective_conflict_resolver(&self) -> Arc<dyn ConflictResolver> {
        match (&self.conflict_resolver, &self.database) {
            (Some(resolver), _) => resolver.clone(),
            (None, Some(database)) => database.conflict_resolver(),
            (None, None) => Arc::new(LastWriteWins),
        }
    }

    fn owner(&self) -> Result<Arc<Database>> {
        self.database
            .clone()
            .ok_or_else(|| Error::NotAttached(self.id.clone()))
    }

    /// Save through the owning database.
    pub fn save(&mut self) -> Result<()> {
        self.owner()?.save(self)
    }

    /// Delete through the owning database.
    pub fn delete(&mut self) -> Result<()> {
        self.owner()?.delete(self)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("revision", &self.revision)
            .field("generation", &self.generation)
            .field("deleted", &self.deleted)
            .field("state", &self.state)
            .field("root", &self.root)
            .finish()
    }
}
