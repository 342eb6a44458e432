//! Copy-on-write array

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::{
    adopt, adopt_inserted, collect_slot_blobs, copy_slot, promote, propagate_change, release,
    Container, MutableDict, ParentLink, SlotKey, WeakContainer,
};
use crate::collection::ArrayView;
use crate::error::{Error, Result};
use crate::fragment::MutableFragment;
use crate::value::{Blob, FromValue, Value};

pub(crate) struct ArrayInner {
    storage: ArrayStorage,
    changed: bool,
    pub(crate) parent: Option<ParentLink>,
}

enum ArrayStorage {
    Unforked {
        backing: ArrayView,
        promoted: HashMap<usize, Value>,
    },
    Forked {
        items: Vec<Value>,
    },
}

impl ArrayInner {
    fn new(storage: ArrayStorage) -> Self {
        Self {
            storage,
            changed: false,
            parent: None,
        }
    }

    fn fork(&mut self) -> &mut Vec<Value> {
        if let ArrayStorage::Unforked { backing, promoted } = &mut self.storage {
            let mut promoted = std::mem::take(promoted);
            let items: Vec<Value> = backing
                .iter()
                .enumerate()
                .map(|(i, value)| promoted.remove(&i).unwrap_or(value))
                .collect();
            debug!(items = items.len(), "forked array");
            self.storage = ArrayStorage::Forked { items };
        }
        let ArrayStorage::Forked { items } = &mut self.storage else {
            unreachable!("array storage forked above");
        };
        items
    }

    fn slot(&self, index: usize) -> Option<&Value> {
        match &self.storage {
            ArrayStorage::Unforked { promoted, .. } => promoted.get(&index),
            ArrayStorage::Forked { items } => items.get(index),
        }
    }
}

/// A copy-on-write editable array.
///
/// Same sharing rules as [`MutableDict`]: cloning the handle shares it.
#[derive(Clone)]
pub struct MutableArray(pub(crate) Rc<RefCell<ArrayInner>>);

impl Default for MutableArray {
    fn default() -> Self {
        Self::new()
    }
}

impl MutableArray {
    /// Create a new, empty array.
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(ArrayInner::new(ArrayStorage::Forked {
            items: Vec::new(),
        }))))
    }

    pub(crate) fn from_view(backing: ArrayView) -> Self {
        Self(Rc::new(RefCell::new(ArrayInner::new(ArrayStorage::Unforked {
            backing,
            promoted: HashMap::new(),
        }))))
    }

    /// Create an array holding `items`.
    ///
    /// # Panics
    ///
    /// Panics if the same mutable container would end up inside itself.
    pub fn from_values(items: Vec<Value>) -> Self {
        let array = Self::new();
        for item in items {
            array.append(item);
        }
        array.0.borrow_mut().changed = false;
        array
    }

    fn as_container(&self) -> Container {
        Container::Array(self.clone())
    }

    fn weak(&self) -> WeakContainer {
        WeakContainer::Array(Rc::downgrade(&self.0))
    }

    /// Number of items
    pub fn count(&self) -> usize {
        match &self.0.borrow().storage {
            ArrayStorage::Unforked { backing, .. } => backing.count(),
            ArrayStorage::Forked { items } => items.len(),
        }
    }

    /// True if there are no items
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Item at `index`; nested containers come back attached to this array.
    pub fn get(&self, index: usize) -> Option<Value> {
        let weak = self.weak();
        let mut inner = self.0.borrow_mut();
        match &mut inner.storage {
            ArrayStorage::Unforked { backing, promoted } => {
                if let Some(value) = promoted.get(&index) {
                    return Some(value.clone());
                }
                let value = backing.get(index)?;
                if !matches!(value, Value::Dict(_) | Value::Array(_)) {
                    return Some(value);
                }
                let value = promote(value, weak, SlotKey::Index(index));
                promoted.insert(index, value.clone());
                Some(value)
            }
            ArrayStorage::Forked { items } => {
                let slot = items.get_mut(index)?;
                if matches!(slot, Value::Dict(_) | Value::Array(_)) {
                    *slot = promote(slot.clone(), weak, SlotKey::Index(index));
                }
                Some(slot.clone())
            }
        }
    }

    /// Like [`get`](Self::get), but past the end is an error.
    pub fn get_checked(&self, index: usize) -> Result<Value> {
        check_index(index, self.count())?;
        self.get(index).ok_or(Error::IndexOutOfBounds {
            index,
            len: self.count(),
        })
    }

    /// Item at `index` converted to a native type.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<Option<T>> {
        match self.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(&value).map(Some),
        }
    }

    /// Nested editable dictionary at `index`, if that is what it holds.
    pub fn get_dict(&self, index: usize) -> Option<MutableDict> {
        match self.get(index)? {
            Value::MutableDict(dict) => Some(dict),
            _ => None,
        }
    }

    /// Nested editable array at `index`, if that is what it holds.
    pub fn get_array(&self, index: usize) -> Option<MutableArray> {
        match self.get(index)? {
            Value::MutableArray(array) => Some(array),
            _ => None,
        }
    }

    /// Start a settable path at `index`.
    pub fn fragment<'a>(&self, index: usize) -> MutableFragment<'a> {
        MutableFragment::of(self.as_container()).index(index)
    }

    /// Whether this array has been written to
    pub fn is_changed(&self) -> bool {
        self.0.borrow().changed
    }

    /// Whether this array owns its items
    pub fn is_forked(&self) -> bool {
        matches!(self.0.borrow().storage, ArrayStorage::Forked { .. })
    }

    /// Replace the item at `index`.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        check_index(index, self.count())?;
        let value = value.into();
        let this = self.as_container();
        adopt(&this, SlotKey::Index(index), &value);
        self.mark_changed();
        let old = {
            let mut inner = self.0.borrow_mut();
            std::mem::replace(&mut inner.fork()[index], value.clone())
        };
        release(&this, &old, Some(&value));
        Ok(())
    }

    /// Insert before `index`; `index == count()` appends.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let len = self.count();
        if index > len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        let value = value.into();
        adopt_inserted(&self.as_container(), SlotKey::Index(index), &value);
        self.mark_changed();
        self.0.borrow_mut().fork().insert(index, value);
        self.reindex_from(index + 1);
        Ok(())
    }

    /// Add an item at the end.
    pub fn append(&self, value: impl Into<Value>) {
        let index = self.count();
        let value = value.into();
        adopt(&self.as_container(), SlotKey::Index(index), &value);
        self.mark_changed();
        self.0.borrow_mut().fork().push(value);
    }

    /// Remove and return the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Value> {
        check_index(index, self.count())?;
        self.mark_changed();
        let old = self.0.borrow_mut().fork().remove(index);
        release(&self.as_container(), &old, None);
        self.reindex_from(index);
        Ok(old)
    }

    /// Remove every item.
    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.mark_changed();
        let old: Vec<Value> = self.0.borrow_mut().fork().drain(..).collect();
        let this = self.as_container();
        for value in &old {
            release(&this, value, None);
        }
    }

    /// Children after an insert or removal carry a stale index.
    fn reindex_from(&self, start: usize) {
        let children: Vec<(usize, Container)> = match &self.0.borrow().storage {
            ArrayStorage::Forked { items } => items
                .iter()
                .enumerate()
                .skip(start)
                .filter_map(|(i, v)| Container::from_value(v).map(|c| (i, c)))
                .collect(),
            ArrayStorage::Unforked { .. } => Vec::new(),
        };
        for (index, child) in children {
            child.set_link_key(SlotKey::Index(index));
        }
    }

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

    /// An independent copy with no parent.
    pub fn deep_copy(&self) -> MutableArray {
        let inner = self.0.borrow();
        let copy = match &inner.storage {
            ArrayStorage::Unforked { backing, .. } => MutableArray::from_view(backing.clone()),
            ArrayStorage::Forked { items } => {
                let copy = MutableArray::new();
                let weak = copy.weak();
                let copied: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .map(|(i, value)| copy_slot(value, weak.clone(), SlotKey::Index(i)))
                    .collect();
                *copy.0.borrow_mut().fork() = copied;
                copy
            }
        };
        copy.0.borrow_mut().changed = inner.changed;
        copy
    }

    /// Project onto a plain `serde_json` tree.
    pub fn to_json(&self) -> serde_json::Value {
        Value::MutableArray(self.clone()).to_json()
    }

    pub(crate) fn unforked_backing(&self) -> Option<ArrayView> {
        match &self.0.borrow().storage {
            ArrayStorage::Unforked { backing, .. } => Some(backing.clone()),
            ArrayStorage::Forked { .. } => None,
        }
    }

    pub(crate) fn peek_items(&self) -> Vec<Value> {
        match &self.0.borrow().storage {
            ArrayStorage::Unforked { backing, promoted } => backing
                .iter()
                .enumerate()
                .map(|(i, value)| promoted.get(&i).cloned().unwrap_or(value))
                .collect(),
            ArrayStorage::Forked { items } => items.clone(),
        }
    }

    pub(crate) fn holds(&self, key: &SlotKey, child: &Container) -> bool {
        let SlotKey::Index(index) = key else {
            return false;
        };
        self.0
            .borrow()
            .slot(*index)
            .and_then(Container::from_value)
            .is_some_and(|held| held.same(child))
    }

    pub(crate) fn detach_child(&self, key: &SlotKey, child: &Container) {
        let SlotKey::Index(index) = key else {
            return;
        };
        let weak = self.weak();
        let mut inner = self.0.borrow_mut();
        match &mut inner.storage {
            ArrayStorage::Unforked { promoted, .. } => {
                promoted.remove(index);
            }
            ArrayStorage::Forked { items } => {
                if let Some(slot) = items.get_mut(*index) {
                    *slot = copy_slot(&child.to_value(), weak, SlotKey::Index(*index));
                }
            }
        }
    }

    pub(crate) fn collect_pending_blobs(&self, out: &mut Vec<Blob>) {
        if let ArrayStorage::Forked { items } = &self.0.borrow().storage {
            for value in items {
                collect_slot_blobs(value, out);
            }
        }
    }
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::IndexOutOfBounds { index, len })
    }
}

impl PartialEq for MutableArray {
    fn eq(&self, other: &Self) -> bool {
        Value::MutableArray(self.clone()) == Value::MutableArray(other.clone())
    }
}

impl fmt::Debug for MutableArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MutableArray({:?}, changed: {})",
            Value::MutableArray(self.clone()),
            self.is_changed()
        )
    }
}
