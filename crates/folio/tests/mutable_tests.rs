//! Tests for copy-on-write containers and change propagation

use folio::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn open(json: serde_json::Value) -> (DictView, MutableDict) {
    let view = MutableDict::from_json(&json).unwrap().snapshot().unwrap();
    let editable = view.to_mutable();
    (view, editable)
}

// ═══════════════════════════════════════════════════════════════════════
// Copy-on-write Isolation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_edits_never_reach_the_backing_buffer() {
    let (view, editable) = open(json!({
        "name": "Ann",
        "tags": ["a", "b"],
        "address": {"city": "Oslo", "geo": {"lat": 59.9}}
    }));
    let before = view.to_json();

    editable.set("name", "Bob");
    editable.get_array("tags").unwrap().append("c");
    editable
        .fragment("address")
        .key("geo")
        .key("lat")
        .set(0.0)
        .unwrap();
    editable.remove("address");

    assert_eq!(view.to_json(), before);

    // A fresh view over the same buffer agrees.
    let reopened = encoding::decode(view.view().buffer().clone()).unwrap();
    assert_eq!(reopened.to_json(), before);
}

#[test]
fn test_two_editors_over_one_view_are_isolated() {
    let (view, first) = open(json!({"a": {"b": 1}}));
    let second = view.to_mutable();

    first.get_dict("a").unwrap().set("b", 2);
    assert_eq!(second.to_json(), json!({"a": {"b": 1}}));
    assert!(!second.is_changed());
}

#[test]
fn test_snapshot_is_detached_from_later_edits() {
    let dict = MutableDict::new();
    dict.set("n", 1);
    let snapshot = dict.snapshot().unwrap();
    dict.set("n", 2);
    assert_eq!(snapshot.get("n"), Some(Value::Int(1)));
}

// ═══════════════════════════════════════════════════════════════════════
// Fork Idempotence
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_reads_never_set_changed() {
    let (_, editable) = open(json!({"a": {"b": [1, {"c": 2}]}, "d": true}));
    let _ = editable.get("d");
    let _ = editable.get_as::<bool>("d").unwrap();
    let _ = editable.fragment("a").key("b").index(1).key("c").value().cloned();
    let _ = editable.to_json();
    let _ = editable.count();
    let _ = editable.keys();
    assert!(!editable.is_changed());
    assert!(!editable.is_forked());
}

#[test]
fn test_changed_stays_set() {
    let (_, editable) = open(json!({"a": 1}));
    editable.set("a", 1);
    for _ in 0..3 {
        assert!(editable.is_changed());
    }
    let _ = editable.get("a");
    assert!(editable.is_changed());
}

#[test]
fn test_new_containers_start_unchanged() {
    assert!(!MutableDict::new().is_changed());
    assert!(!MutableArray::new().is_changed());
    assert!(!MutableDict::from_json(&json!({"a": {"b": 1}})).unwrap().is_changed());
}

// ═══════════════════════════════════════════════════════════════════════
// Change Propagation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_leaf_edit_marks_exactly_its_ancestors() {
    let (_, root) = open(json!({
        "l1": {"l2": {"l3": {"leaf": 0}, "sibling3": {}}, "sibling2": {"x": 1}},
        "sibling1": [1, 2, 3]
    }));
    let l1 = root.get_dict("l1").unwrap();
    let l2 = l1.get_dict("l2").unwrap();
    let l3 = l2.get_dict("l3").unwrap();
    let sibling1 = root.get_array("sibling1").unwrap();
    let sibling2 = l1.get_dict("sibling2").unwrap();
    let sibling3 = l2.get_dict("sibling3").unwrap();

    l3.set("leaf", 1);

    for ancestor in [&root, &l1, &l2, &l3] {
        assert!(ancestor.is_changed());
    }
    assert!(!sibling1.is_changed());
    assert!(!sibling2.is_changed());
    assert!(!sibling3.is_changed());
    assert!(!sibling1.is_forked());
    assert!(!sibling2.is_forked());
    assert!(!sibling3.is_forked());
}

#[test]
fn test_propagation_through_arrays() {
    let (_, root) = open(json!({"rows": [[{"v": 1}]]}));
    let cell = root
        .get_array("rows")
        .unwrap()
        .get_array(0)
        .unwrap()
        .get_dict(0)
        .unwrap();
    cell.set("v", 2);
    assert!(root.is_changed());
    assert_eq!(root.to_json(), json!({"rows": [[{"v": 2}]]}));
}

#[test]
fn test_detached_child_edits_stay_local() {
    let (_, root) = open(json!({"child": {"v": 1}}));
    let child = root.get_dict("child").unwrap();
    root.set("child", "replaced");
    let snapshot = root.to_json();

    child.set("v", 2);
    assert_eq!(root.to_json(), snapshot);
    assert_eq!(child.to_json(), json!({"v": 2}));
}

#[test]
fn test_clear_detaches_children() {
    let (_, root) = open(json!({"a": {"v": 1}, "b": 2}));
    let a = root.get_dict("a").unwrap();
    root.clear();
    a.set("v", 9);
    assert!(root.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
// Reparenting
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_container_has_one_parent() {
    let first = MutableDict::new();
    let second = MutableDict::new();
    let child = MutableDict::new();
    child.set("v", 1);

    first.set("child", child.clone());
    second.set("child", child.clone());
    child.set("v", 2);

    assert_eq!(first.to_json(), json!({"child": {"v": 1}}));
    assert_eq!(second.to_json(), json!({"child": {"v": 2}}));
}

#[test]
fn test_move_within_one_dictionary() {
    let root = MutableDict::from_json(&json!({"from": {"v": 1}})).unwrap();
    let moving = root.get_dict("from").unwrap();
    root.set("to", moving.clone());
    root.remove("from");
    moving.set("v", 2);
    assert_eq!(root.to_json(), json!({"to": {"v": 2}}));
}

#[test]
fn test_move_out_of_unforked_parent_keeps_its_content() {
    let (view, root) = open(json!({"inner": {"v": 1}}));
    let inner = root.get_dict("inner").unwrap();
    let other = MutableDict::new();
    other.set("inner", inner.clone());
    inner.set("v", 2);

    assert!(!root.is_changed());
    assert_eq!(root.to_json(), view.to_json());
    assert_eq!(other.to_json(), json!({"inner": {"v": 2}}));
}

#[test]
fn test_insert_before_own_slot_moves_the_handle() {
    let (_, root) = open(json!({"list": [{"n": 1}, 5]}));
    let list = root.get_array("list").unwrap();
    let child = list.get_dict(0).unwrap();

    list.insert(0, child.clone()).unwrap();
    child.set("n", 99);
    assert_eq!(root.to_json(), json!({"list": [{"n": 99}, {"n": 1}, 5]}));

    list.get_dict(1).unwrap().set("n", 2);
    assert_eq!(child.to_json(), json!({"n": 99}));
    assert_eq!(root.to_json(), json!({"list": [{"n": 99}, {"n": 2}, 5]}));
}

#[test]
fn test_insert_before_own_slot_in_forked_array() {
    let list = MutableArray::from_values(vec![Value::Int(0)]);
    let child = MutableDict::new();
    child.set("n", 1);
    list.append(child.clone());

    list.insert(1, child.clone()).unwrap();
    child.set("n", 7);
    assert_eq!(list.to_json(), json!([0, {"n": 7}, {"n": 1}]));
}

#[test]
#[should_panic(expected = "own subtree")]
fn test_storing_ancestor_panics() {
    let root = MutableDict::new();
    let child = MutableDict::new();
    let grandchild = MutableArray::new();
    root.set("child", child.clone());
    child.set("list", grandchild.clone());
    grandchild.append(root);
}

// ═══════════════════════════════════════════════════════════════════════
// Arrays
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_array_operations() {
    let array = MutableArray::from_values(vec![Value::Int(1), Value::Int(2)]);
    array.append(3);
    array.insert(0, 0).unwrap();
    array.set(1, "one").unwrap();
    assert_eq!(array.to_json(), json!([0, "one", 2, 3]));

    assert_eq!(array.remove_at(3).unwrap(), Value::Int(3));
    assert!(matches!(
        array.insert(5, 9),
        Err(Error::IndexOutOfBounds { index: 5, len: 3 })
    ));
    assert_eq!(array.get_checked(0).unwrap(), Value::Int(0));
    assert!(matches!(
        array.get_checked(3),
        Err(Error::IndexOutOfBounds { index: 3, len: 3 })
    ));
    array.clear();
    assert!(array.is_empty());
}

#[test]
fn test_array_get_as() {
    let array = MutableArray::from_values(vec![Value::Int(1), Value::Null]);
    assert_eq!(array.get_as::<i64>(0).unwrap(), Some(1));
    assert_eq!(array.get_as::<i64>(1).unwrap(), None);
    assert_eq!(array.get_as::<i64>(5).unwrap(), None);
    assert!(array.get_as::<String>(0).is_err());
}

// ═══════════════════════════════════════════════════════════════════════
// Equality
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_view_and_mutable_compare_by_content() {
    let (view, editable) = open(json!({"a": [1, {"b": null}]}));
    assert_eq!(Value::Dict(view.clone()), Value::MutableDict(editable.clone()));
    editable.set("c", 1);
    assert_ne!(Value::Dict(view), Value::MutableDict(editable));
}

#[test]
fn test_dictionary_equality_ignores_edit_order() {
    let a = MutableDict::new();
    a.set("x", 1);
    a.set("y", 2);
    let b = MutableDict::new();
    b.set("y", 2);
    b.set("x", 1);
    assert_eq!(a, b);
}
