//! Copy-on-write dictionary

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::{
    adopt, collect_slot_blobs, copy_slot, promote, propagate_change, release, Container, ParentLink,
    SlotKey, WeakContainer,
};
use crate::collection::DictView;
use crate::encoding::{decode, encode_dict};
use crate::error::{Error, Result};
use crate::fragment::MutableFragment;
use crate::value::{Blob, FromValue, Value};

pub(crate) struct DictInner {
    storage: DictStorage,
    changed: bool,
    pub(crate) parent: Option<ParentLink>,
}

enum DictStorage {
    /// Reads go to the backing view. `promoted` caches mutable handles for
    /// nested containers already handed out, so repeated reads return the
    /// same handle; it is not independent storage.
    Unforked {
        backing: DictView,
        promoted: HashMap<String, Value>,
    },
    /// Owned slots, in edit order.
    Forked { slots: IndexMap<String, Value> },
}

impl DictInner {
    fn new(storage: DictStorage) -> Self {
        Self {
            storage,
            changed: false,
            parent: None,
        }
    }

    /// Fork on first write. Slots keep referencing the backing data.
    fn fork(&mut self) -> &mut IndexMap<String, Value> {
        if let DictStorage::Unforked { backing, promoted } = &mut self.storage {
            let mut promoted = std::mem::take(promoted);
            let slots: IndexMap<String, Value> = backing
                .iter()
                .map(|(key, value)| {
                    let value = promoted.remove(key).unwrap_or(value);
                    (key.to_string(), value)
                })
                .collect();
            debug!(entries = slots.len(), "forked dictionary");
            self.storage = DictStorage::Forked { slots };
        }
        let DictStorage::Forked { slots } = &mut self.storage else {
            unreachable!("dictionary storage forked above");
        };
        slots
    }

    fn slot(&self, key: &str) -> Option<&Value> {
        match &self.storage {
            DictStorage::Unforked { promoted, .. } => promoted.get(key),
            DictStorage::Forked { slots } => slots.get(key),
        }
    }
}

/// A copy-on-write editable dictionary.
///
/// Cloning the handle shares the dictionary; use [`deep_copy`](Self::deep_copy)
/// for an independent one.
///
/// # Example
///
/// ```
/// use folio::{MutableDict, Value};
///
/// let address = MutableDict::new();
/// address.set("city", "Oslo");
///
/// let person = MutableDict::new();
/// person.set("name", "Ann");
/// person.set("address", address);
///
/// let snapshot = person.snapshot().unwrap();
/// let editable = snapshot.to_mutable();
/// assert!(!editable.is_changed());
///
/// editable
///     .fragment("address")
///     .key("city")
///     .set("Bergen")
///     .unwrap();
/// assert!(editable.is_changed());
///
/// // The snapshot is unaffected by edits to its editor.
/// assert_eq!(
///     snapshot.fragment("address").key("city").value(),
///     Some(&Value::string("Oslo"))
/// );
/// ```
#[derive(Clone)]
pub struct MutableDict(pub(crate) Rc<RefCell<DictInner>>);

impl Default for MutableDict {
    fn default() -> Self {
        Self::new()
    }
}

impl MutableDict {
    /// Create a new, empty dictionary.
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(DictInner::new(DictStorage::Forked {
            slots: IndexMap::new(),
        }))))
    }

    pub(crate) fn from_view(backing: DictView) -> Self {
        Self(Rc::new(RefCell::new(DictInner::new(DictStorage::Unforked {
            backing,
            promoted: HashMap::new(),
        }))))
    }

    /// Build a dictionary from a JSON object.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_json_map(map)),
            other => Err(Error::TypeMismatch {
                expected: "dictionary",
                got: crate::error::type_name(&Value::from_json(other)),
            }),
        }
    }

    pub(crate) fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let dict = Self::new();
        for (key, value) in map {
            dict.set(key.as_str(), Value::from_json(value));
        }
        dict.0.borrow_mut().changed = false;
        dict
    }

    fn as_container(&self) -> Container {
        Container::Dict(self.clone())
    }

    fn weak(&self) -> WeakContainer {
        WeakContainer::Dict(Rc::downgrade(&self.0))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════

    /// Number of entries
    pub fn count(&self) -> usize {
        match &self.0.borrow().storage {
            DictStorage::Unforked { backing, .. } => backing.count(),
            DictStorage::Forked { slots } => slots.len(),
        }
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        match &self.0.borrow().storage {
            DictStorage::Unforked { backing, .. } => backing.contains_key(key),
            DictStorage::Forked { slots } => slots.contains_key(key),
        }
    }

    /// Keys; encoding order until forked, then edit order.
    pub fn keys(&self) -> Vec<String> {
        match &self.0.borrow().storage {
            DictStorage::Unforked { backing, .. } => backing.keys().map(str::to_string).collect(),
            DictStorage::Forked { slots } => slots.keys().cloned().collect(),
        }
    }

    /// Look up a key.
    ///
    /// A nested container comes back as a mutable handle attached to this
    /// dictionary, so edits made through it mark this dictionary changed.
    /// Reading never forks and never sets the changed flag.
    pub fn get(&self, key: &str) -> Option<Value> {
        let weak = self.weak();
        let mut inner = self.0.borrow_mut();
        match &mut inner.storage {
            DictStorage::Unforked { backing, promoted } => {
                if let Some(value) = promoted.get(key) {
                    return Some(value.clone());
                }
                let value = backing.get(key)?;
                if !matches!(value, Value::Dict(_) | Value::Array(_)) {
                    return Some(value);
                }
                let value = promote(value, weak, SlotKey::Key(key.to_string()));
                promoted.insert(key.to_string(), value.clone());
                Some(value)
            }
            DictStorage::Forked { slots } => {
                let slot = slots.get_mut(key)?;
                if matches!(slot, Value::Dict(_) | Value::Array(_)) {
                    *slot = promote(slot.clone(), weak, SlotKey::Key(key.to_string()));
                }
                Some(slot.clone())
            }
        }
    }

    /// Look up a key and convert it to a native type.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(&value).map(Some),
        }
    }

    /// Nested editable dictionary at `key`, if that is what it holds.
    pub fn get_dict(&self, key: &str) -> Option<MutableDict> {
        match self.get(key)? {
            Value::MutableDict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Nested editable array at `key`, if that is what it holds.
    pub fn get_array(&self, key: &str) -> Option<super::MutableArray> {
        match self.get(key)? {
            Value::MutableArray(array) => Some(array),
            _ => None,
        }
    }

    /// Start a settable path at `key`.
    pub fn fragment<'a>(&self, key: &'a str) -> MutableFragment<'a> {
        MutableFragment::of(self.as_container()).key(key)
    }

    /// Whether this dictionary has been written to
    pub fn is_changed(&self) -> bool {
        self.0.borrow().changed
    }

    /// Whether this dictionary owns its slots (has been written to at least
    /// once, or was created empty).
    pub fn is_forked(&self) -> bool {
        matches!(self.0.borrow().storage, DictStorage::Forked { .. })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════

    /// Set `key` to `value`.
    ///
    /// # Panics
    ///
    /// Panics if `value` is this dictionary or one of its ancestors.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let this = self.as_container();
        adopt(&this, SlotKey::Key(key.clone()), &value);
        self.mark_changed();
        let old = self.0.borrow_mut().fork().insert(key, value.clone());
        if let Some(old) = old {
            release(&this, &old, Some(&value));
        }
    }

    /// Remove `key`, returning its value. Removing an absent key is a no-op
    /// and does not fork.
    pub fn remove(&self, key: &str) -> Option<Value> {
        if !self.contains_key(key) {
            return None;
        }
        self.mark_changed();
        let old = self.0.borrow_mut().fork().shift_remove(key)?;
        release(&self.as_container(), &old, None);
        Some(old)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.mark_changed();
        let old: Vec<Value> = self.0.borrow_mut().fork().drain(..).map(|(_, v)| v).collect();
        let this = self.as_container();
        for value in &old {
            release(&this, value, None);
        }
    }

    /// Fork if needed, set the changed flag and notify ancestors.
    pub(crate) fn mark_changed(&self) {
        let link = {
            let mut inner = self.0.borrow_mut();
            inner.fork();
            if inner.changed {
                return;
            }
            inner.changed = true;
            inner.parent.clone()
        };
        propagate_change(&self.as_container(), link);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Copies and Snapshots
    // ═══════════════════════════════════════════════════════════════════

    /// An independent copy. Immutable data stays shared; mutable children
    /// are copied. The copy has no parent.
    pub fn deep_copy(&self) -> MutableDict {
        let inner = self.0.borrow();
        let copy = match &inner.storage {
            DictStorage::Unforked { backing, .. } => MutableDict::from_view(backing.clone()),
            DictStorage::Forked { slots } => {
                let copy = MutableDict::new();
                let weak = copy.weak();
                let copied: IndexMap<String, Value> = slots
                    .iter()
                    .map(|(key, value)| {
                        let slot = copy_slot(value, weak.clone(), SlotKey::Key(key.clone()));
                        (key.clone(), slot)
                    })
                    .collect();
                *copy.0.borrow_mut().fork() = copied;
                copy
            }
        };
        copy.0.borrow_mut().changed = inner.changed;
        copy
    }

    /// Encode and re-open as an immutable view.
    pub fn snapshot(&self) -> Result<DictView> {
        Ok(decode(encode_dict(self)?)?)
    }

    /// Project onto a plain `serde_json` tree.
    pub fn to_json(&self) -> serde_json::Value {
        Value::MutableDict(self.clone()).to_json()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Crate Internals
    // ═══════════════════════════════════════════════════════════════════

    /// The backing view while unforked; an unforked dictionary has no edits
    /// anywhere below it.
    pub(crate) fn unforked_backing(&self) -> Option<DictView> {
        match &self.0.borrow().storage {
            DictStorage::Unforked { backing, .. } => Some(backing.clone()),
            DictStorage::Forked { .. } => None,
        }
    }

    /// Current entries without promoting nested containers.
    pub(crate) fn peek_entries(&self) -> Vec<(String, Value)> {
        match &self.0.borrow().storage {
            DictStorage::Unforked { backing, promoted } => backing
                .iter()
                .map(|(key, value)| {
                    let value = promoted.get(key).cloned().unwrap_or(value);
                    (key.to_string(), value)
                })
                .collect(),
            DictStorage::Forked { slots } => {
                slots.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
        }
    }

    pub(crate) fn holds(&self, key: &SlotKey, child: &Container) -> bool {
        let SlotKey::Key(key) = key else {
            return false;
        };
        self.0
            .borrow()
            .slot(key)
            .and_then(Container::from_value)
            .is_some_and(|held| held.same(child))
    }

    /// Stop holding `child` at `key` without changing content.
    pub(crate) fn detach_child(&self, key: &SlotKey, child: &Container) {
        let SlotKey::Key(key) = key else {
            return;
        };
        let weak = self.weak();
        let mut inner = self.0.borrow_mut();
        match &mut inner.storage {
            DictStorage::Unforked { promoted, .. } => {
                promoted.remove(key);
            }
            DictStorage::Forked { slots } => {
                if let Some(slot) = slots.get_mut(key) {
                    *slot = copy_slot(&child.to_value(), weak, SlotKey::Key(key.clone()));
                }
            }
        }
    }

    pub(crate) fn collect_pending_blobs(&self, out: &mut Vec<Blob>) {
        if let DictStorage::Forked { slots } = &self.0.borrow().storage {
            for value in slots.values() {
                collect_slot_blobs(value, out);
            }
        }
    }
}

impl PartialEq for MutableDict {
    fn eq(&self, other: &Self) -> bool {
        Value::MutableDict(self.clone()) == Value::MutableDict(other.clone())
    }
}

impl fmt::Debug for MutableDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MutableDict({:?}, changed: {})",
            Value::MutableDict(self.clone()),
            self.is_changed()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn loaded(json: serde_json::Value) -> MutableDict {
        MutableDict::from_json(&json)
            .unwrap()
            .snapshot()
            .unwrap()
            .to_mutable()
    }

    #[test]
    fn test_reads_do_not_fork() {
        let dict = loaded(json!({"a": 1, "b": {"c": [1, 2]}}));
        assert_eq!(dict.get("a"), Some(Value::Int(1)));
        let _ = dict.get("b");
        let _ = dict.get("missing");
        assert!(!dict.is_forked());
        assert!(!dict.is_changed());
    }

    #[test]
    fn test_first_write_forks() {
        let dict = loaded(json!({"a": 1}));
        dict.set("b", 2);
        assert!(dict.is_forked());
        assert!(dict.is_changed());
        assert_eq!(dict.to_json(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_remove_absent_key_does_not_fork() {
        let dict = loaded(json!({"a": 1}));
        assert_eq!(dict.remove("zzz"), None);
        assert!(!dict.is_changed());
        assert_eq!(dict.remove("a"), Some(Value::Int(1)));
        assert!(dict.is_changed());
        assert!(dict.is_empty());
    }

    #[test]
    fn test_nested_read_returns_same_handle() {
        let dict = loaded(json!({"b": {"c": 1}}));
        let first = dict.get_dict("b").unwrap();
        let second = dict.get_dict("b").unwrap();
        first.set("c", 2);
        assert_eq!(second.get("c"), Some(Value::Int(2)));
    }

    #[test]
    fn test_nested_edit_propagates() {
        let dict = loaded(json!({"b": {"c": {"d": 1}}, "x": 0}));
        let c = dict.get_dict("b").unwrap().get_dict("c").unwrap();
        c.set("d", 5);
        assert!(dict.is_changed());
        assert!(dict.get_dict("b").unwrap().is_changed());
        assert_eq!(dict.to_json(), json!({"b": {"c": {"d": 5}}, "x": 0}));
    }

    #[test]
    fn test_removed_child_no_longer_propagates() {
        let dict = loaded(json!({"b": {"c": 1}}));
        let b = dict.get_dict("b").unwrap();
        dict.remove("b");
        let before = dict.to_json();
        b.set("c", 99);
        assert_eq!(dict.to_json(), before);
        assert!(b.0.borrow().parent.is_none());
    }

    #[test]
    fn test_move_leaves_copy_behind() {
        let source = loaded(json!({"inner": {"v": 1}}));
        let target = MutableDict::new();
        let inner = source.get_dict("inner").unwrap();
        target.set("moved", inner.clone());
        inner.set("v", 2);

        assert_eq!(target.to_json(), json!({"moved": {"v": 2}}));
        assert_eq!(source.to_json(), json!({"inner": {"v": 1}}));
    }

    #[test]
    #[should_panic(expected = "own subtree")]
    fn test_cycle_is_rejected() {
        let outer = MutableDict::new();
        let inner = MutableDict::new();
        outer.set("inner", inner.clone());
        inner.set("outer", outer);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let dict = MutableDict::from_json(&json!({"a": {"b": 1}})).unwrap();
        let copy = dict.deep_copy();
        copy.get_dict("a").unwrap().set("b", 2);
        assert_eq!(dict.to_json(), json!({"a": {"b": 1}}));
        assert_eq!(copy.to_json(), json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(matches!(
            MutableDict::from_json(&json!([1])),
            Err(Error::TypeMismatch { got: "array", .. })
        ));
    }
}
