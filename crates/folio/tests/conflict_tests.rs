//! Tests for conflicting saves and their resolution

use std::sync::Arc;

use folio::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A saved document plus a second handle on the same revision.
fn diverged(db: &Arc<Database>, id: &str, initial: serde_json::Value) -> (Document, Document) {
    let mut doc = db.load(id, false).unwrap();
    for (key, value) in initial.as_object().unwrap() {
        doc.set(key.as_str(), Value::from_json(value));
    }
    doc.save().unwrap();
    let other = db.document(id).unwrap().unwrap();
    (doc, other)
}

fn three_way_merge(conflict: &Conflict) -> Resolution {
    let merged = conflict.theirs.to_mutable();
    for (key, value) in conflict.mine.iter() {
        if conflict.base.get(key).as_ref() != Some(&value) {
            merged.set(key, value);
        }
    }
    for key in conflict.base.keys() {
        if !conflict.mine.contains_key(key) {
            merged.remove(key);
        }
    }
    Resolution::Merged(merged)
}

// ═══════════════════════════════════════════════════════════════════════
// Default Policy
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_concurrent_writer_scenario() {
    init_tracing();
    let db = Database::in_memory("people");
    let (mut doc, mut other) = diverged(&db, "person", json!({"name": "Ann"}));
    assert_eq!(doc.generation(), 1);
    assert!(doc.exists());

    other.set("name", "Bob");
    other.save().unwrap();

    doc.set("age", 30);
    doc.save().unwrap();

    assert_eq!(doc.state(), DocumentState::Saved);
    assert_eq!(doc.generation(), 2);
    assert_eq!(doc.revision_id(), other.revision_id());
    assert_eq!(doc.to_json(), json!({"name": "Bob"}));
    assert!(!doc.is_changed());
}

#[test]
fn test_shorter_edit_wins_and_is_written() {
    let db = Database::in_memory("people");
    let (mut doc, mut other) = diverged(&db, "p", json!({"name": "Ann", "age": 30}));

    other.set("city", "Oslo");
    other.save().unwrap();

    doc.remove("age");
    doc.save().unwrap();

    assert_eq!(doc.generation(), 3);
    assert_eq!(doc.to_json(), json!({"name": "Ann"}));
    let current = db.document("p").unwrap().unwrap();
    assert_eq!(current.to_json(), json!({"name": "Ann"}));
    assert_eq!(current.revision_id(), doc.revision_id());

    let ancestor = db
        .common_ancestor("p", doc.revision_id().unwrap(), other.revision_id().unwrap())
        .unwrap();
    assert_eq!(ancestor.as_ref(), other.revision_id());
}

#[test]
fn test_deletion_wins_against_edit() {
    let db = Database::in_memory("db");
    let (mut doc, mut other) = diverged(&db, "d", json!({"k": 1}));

    other.delete().unwrap();
    doc.set("k", 2);
    doc.save().unwrap();

    assert!(doc.is_deleted());
    assert_eq!(doc.revision_id(), other.revision_id());
    assert!(db.document("d").unwrap().is_none());
}

#[test]
fn test_delete_wins_against_concurrent_edit() {
    let db = Database::in_memory("db");
    let (mut doc, mut other) = diverged(&db, "d", json!({"k": 1}));

    other.set("k", 2);
    other.save().unwrap();
    doc.delete().unwrap();

    assert!(doc.is_deleted());
    assert_eq!(doc.generation(), 3);
    assert!(db.document("d").unwrap().is_none());
}

#[test]
fn test_resolution_is_deterministic_across_databases() {
    let run = || {
        let db = Database::in_memory("db");
        let (mut doc, mut other) = diverged(&db, "d", json!({"name": "Ann"}));
        other.set("name", "Bea");
        other.save().unwrap();
        doc.set("name", "Cid");
        doc.save().unwrap();
        (doc.revision_id().cloned(), doc.generation(), doc.to_json())
    };
    let first = run();
    for _ in 0..3 {
        assert_eq!(run(), first);
    }
}

#[test]
fn test_default_policy_is_stable_for_fixed_inputs() {
    let view = |json: serde_json::Value| MutableDict::from_json(&json).unwrap().snapshot().unwrap();
    let conflict = Conflict {
        document_id: "d".to_string(),
        mine: view(json!({"v": "mine"})),
        theirs: view(json!({"v": "ours"})),
        base: view(json!({"v": "base"})),
        mine_revision: Some(RevisionId::new("1-abc")),
        theirs_revision: RevisionId::new("2-def"),
        base_revision: RevisionId::new("1-abc"),
        mine_deleted: false,
        theirs_deleted: false,
    };
    let outcomes: Vec<serde_json::Value> = (0..5)
        .map(|_| match LastWriteWins.resolve(&conflict) {
            Resolution::Merged(dict) => dict.to_json(),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert!(outcomes.iter().all(|o| *o == json!({"v": "ours"})));
}

// ═══════════════════════════════════════════════════════════════════════
// Pluggable Policies
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_three_way_merge_resolver() {
    init_tracing();
    let resolver: Arc<dyn ConflictResolver> = Arc::new(three_way_merge);
    let db = Arc::new(
        Database::new("people", Arc::new(MemoryStore::new())).with_conflict_resolver(resolver),
    );
    let (mut doc, mut other) = diverged(&db, "p", json!({"name": "Ann", "tmp": true}));

    other.set("name", "Bob");
    other.save().unwrap();

    doc.set("age", 30);
    doc.remove("tmp");
    doc.save().unwrap();

    assert_eq!(doc.generation(), 3);
    assert_eq!(doc.to_json(), json!({"age": 30, "name": "Bob"}));
}

#[test]
fn test_resolver_receives_all_three_sides() {
    let seen = Arc::new(std::sync::Mutex::new(None));
    let record = seen.clone();
    let resolver: Arc<dyn ConflictResolver> = Arc::new(move |conflict: &Conflict| {
        *record.lock().unwrap() = Some((
            conflict.mine.to_json(),
            conflict.theirs.to_json(),
            conflict.base.to_json(),
        ));
        Resolution::Merged(conflict.mine.to_mutable())
    });
    let db = Database::in_memory("db");
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));
    doc.set_conflict_resolver(Some(resolver));

    other.set("v", 1);
    other.save().unwrap();
    doc.set("v", 2);
    doc.save().unwrap();

    let (mine, theirs, base) = seen.lock().unwrap().take().unwrap();
    assert_eq!(mine, json!({"v": 2}));
    assert_eq!(theirs, json!({"v": 1}));
    assert_eq!(base, json!({"v": 0}));
    assert_eq!(db.document("d").unwrap().unwrap().to_json(), json!({"v": 2}));
}

#[test]
fn test_document_resolver_overrides_database() {
    let db = Database::in_memory("db");
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));
    doc.set_conflict_resolver(Some(Arc::new(|_: &Conflict| Resolution::Declined)));

    other.set("v", 1);
    other.save().unwrap();
    doc.set("v", 2);
    assert!(matches!(doc.save(), Err(Error::NonMergeableConflict(_))));
}

// ═══════════════════════════════════════════════════════════════════════
// Unresolved Conflicts
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_declined_merge_surfaces_both_sides() {
    let declined: Arc<dyn ConflictResolver> = Arc::new(|_: &Conflict| Resolution::Declined);
    let db = Arc::new(
        Database::new("db", Arc::new(MemoryStore::new())).with_conflict_resolver(declined),
    );
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));

    other.set("v", 1);
    other.save().unwrap();
    doc.set("v", 2);

    let unresolved = match doc.save() {
        Err(Error::NonMergeableConflict(unresolved)) => unresolved,
        other => panic!("expected unresolved conflict, got {:?}", other),
    };
    assert_eq!(unresolved.reason, UnresolvedReason::Declined);
    assert_eq!(unresolved.mine.to_json(), json!({"v": 2}));
    assert_eq!(unresolved.theirs.to_json(), json!({"v": 1}));
    assert_eq!(Some(&unresolved.theirs_revision), other.revision_id());

    assert_eq!(doc.state(), DocumentState::SaveFailed);
    assert_eq!(doc.generation(), 1);
    assert_eq!(doc.get("v"), Some(Value::Int(2)));
}

#[test]
fn test_new_document_has_no_common_ancestor() {
    let db = Database::in_memory("db");
    let (_, _) = diverged(&db, "d", json!({"v": 0}));

    let mut stranger = Document::new("d");
    stranger.set("v", 9);
    let err = db.save(&mut stranger).unwrap_err();
    assert!(matches!(
        err,
        Error::NonMergeableConflict(ref u) if u.reason == UnresolvedReason::NoCommonAncestor
    ));
    assert_eq!(stranger.state(), DocumentState::SaveFailed);
}

#[test]
fn test_ancestor_beyond_search_depth() {
    let db = Arc::new(
        Database::new("db", Arc::new(MemoryStore::new()))
            .with_config(DatabaseConfig::with_max_ancestor_depth(2)),
    );
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));
    for n in 1..=2 {
        other.set("v", n);
        other.save().unwrap();
    }
    doc.set("v", -1);
    assert!(matches!(
        doc.save(),
        Err(Error::NonMergeableConflict(ref u)) if u.reason == UnresolvedReason::NoCommonAncestor
    ));
}

#[test]
fn test_pruned_history_is_not_mergeable() {
    let store = Arc::new(MemoryStore::new().with_max_revision_history(2));
    let db = Arc::new(Database::new("db", store.clone()));
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));
    for n in 1..=3 {
        other.set("v", n);
        other.save().unwrap();
    }
    assert_eq!(store.revision_count("d"), 2);
    doc.set("v", 5);
    assert!(matches!(doc.save(), Err(Error::NonMergeableConflict(_))));
}

#[test]
fn test_resolution_disabled() {
    let db = Arc::new(
        Database::new("db", Arc::new(MemoryStore::new()))
            .with_config(DatabaseConfig::with_conflict_resolution_passes(0)),
    );
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));
    other.set("v", 1);
    other.save().unwrap();
    doc.set("v", 2);
    assert!(matches!(doc.save(), Err(Error::Conflict { .. })));
    assert_eq!(doc.state(), DocumentState::SaveFailed);
}

#[test]
fn test_repeated_conflict_is_bounded() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let interloper = store.clone();
    // Another writer gets in while the resolver runs, so the retry is stale too.
    let resolver: Arc<dyn ConflictResolver> = Arc::new(move |conflict: &Conflict| {
        let body = encoding::encode_dict(&conflict.theirs.to_mutable()).unwrap();
        interloper
            .save_if_current(
                &conflict.document_id,
                Some(&conflict.theirs_revision),
                body.into(),
                false,
            )
            .unwrap();
        Resolution::Merged(conflict.mine.to_mutable())
    });
    let db = Arc::new(Database::new("db", store.clone()).with_conflict_resolver(resolver));
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));
    other.set("v", 1);
    other.save().unwrap();
    doc.set("v", 2);

    let err = doc.save().unwrap_err();
    assert!(matches!(err, Error::Conflict { ref document_id, .. } if document_id == "d"));
    assert_eq!(doc.state(), DocumentState::SaveFailed);
    assert_eq!(store.load_current("d").unwrap().generation, 3);
}

#[test]
fn test_retry_after_failed_save() {
    let db = Database::in_memory("db");
    let (mut doc, mut other) = diverged(&db, "d", json!({"v": 0}));
    doc.set_conflict_resolver(Some(Arc::new(|_: &Conflict| Resolution::Declined)));
    other.set("v", 1);
    other.save().unwrap();
    doc.set("v", 2);
    assert!(doc.save().is_err());

    // Rebase by hand: reload, reapply, save.
    let mut fresh = db.document("d").unwrap().unwrap();
    fresh.set("v", doc.get("v").unwrap());
    fresh.save().unwrap();
    assert_eq!(fresh.generation(), 3);
    assert_eq!(fresh.get_as::<i64>("v").unwrap(), Some(2));
}
