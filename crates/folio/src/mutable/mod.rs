//! Copy-on-write editable containers
//!
//! A [`MutableDict`] or [`MutableArray`] starts *unforked*: every read is
//! served by the immutable view it was created from. The first write forks
//! it (copying slot references, never the encoded subtrees behind them),
//! sets its `changed` flag and walks the parent back-references upward,
//! marking each ancestor changed until it meets one that already is.
//!
//! Parents own their children through `Rc`; children point back with a
//! `Weak` plus the key they live under, so the tree has no strong cycles.
//! A back-reference is checked against the parent's slot before it is used,
//! and cleared when the child is overwritten or removed.
//!
//! Handles are `Rc`-based and therefore `!Send`: a mutable tree belongs to
//! one owner at a time. Share data across threads with the immutable views.

mod array;
mod dict;

pub use array::MutableArray;
pub use dict::MutableDict;

pub(crate) use array::ArrayInner;
pub(crate) use dict::DictInner;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::value::{Blob, Value};

/// Where a child lives inside its parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SlotKey {
    Key(String),
    Index(usize),
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Key(key) => write!(f, "{:?}", key),
            SlotKey::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Non-owning reference to a parent container.
#[derive(Clone)]
pub(crate) enum WeakContainer {
    Dict(Weak<RefCell<DictInner>>),
    Array(Weak<RefCell<ArrayInner>>),
}

impl WeakContainer {
    fn upgrade(&self) -> Option<Container> {
        match self {
            WeakContainer::Dict(weak) => weak.upgrade().map(|rc| Container::Dict(MutableDict(rc))),
            WeakContainer::Array(weak) => {
                weak.upgrade().map(|rc| Container::Array(MutableArray(rc)))
            }
        }
    }

    fn points_to(&self, container: &Container) -> bool {
        match (self, container) {
            (WeakContainer::Dict(weak), Container::Dict(dict)) => {
                weak.as_ptr() == Rc::as_ptr(&dict.0)
            }
            (WeakContainer::Array(weak), Container::Array(array)) => {
                weak.as_ptr() == Rc::as_ptr(&array.0)
            }
            _ => false,
        }
    }
}

/// Back-reference from a child to the slot that holds it.
#[derive(Clone)]
pub(crate) struct ParentLink {
    pub(crate) parent: WeakContainer,
    pub(crate) key: SlotKey,
}

/// A mutable container of either shape.
#[derive(Clone, Debug)]
pub enum Container {
    /// Editable dictionary
    Dict(MutableDict),
    /// Editable array
    Array(MutableArray),
}

impl Container {
    /// The container held by `value`, if it is a mutable one.
    pub fn from_value(value: &Value) -> Option<Container> {
        match value {
            Value::MutableDict(dict) => Some(Container::Dict(dict.clone())),
            Value::MutableArray(array) => Some(Container::Array(array.clone())),
            _ => None,
        }
    }

    /// Wrap this handle as a value
    pub fn to_value(&self) -> Value {
        match self {
            Container::Dict(dict) => Value::MutableDict(dict.clone()),
            Container::Array(array) => Value::MutableArray(array.clone()),
        }
    }

    /// Whether this container has been written to
    pub fn is_changed(&self) -> bool {
        match self {
            Container::Dict(dict) => dict.is_changed(),
            Container::Array(array) => array.is_changed(),
        }
    }

    /// Number of entries or items
    pub fn count(&self) -> usize {
        match self {
            Container::Dict(dict) => dict.count(),
            Container::Array(array) => array.count(),
        }
    }

    /// True when both handles refer to the same container.
    pub fn same(&self, other: &Container) -> bool {
        match (self, other) {
            (Container::Dict(a), Container::Dict(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Container::Array(a), Container::Array(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContainer {
        match self {
            Container::Dict(dict) => WeakContainer::Dict(Rc::downgrade(&dict.0)),
            Container::Array(array) => WeakContainer::Array(Rc::downgrade(&array.0)),
        }
    }

    pub(crate) fn parent_link(&self) -> Option<ParentLink> {
        match self {
            Container::Dict(dict) => dict.0.borrow().parent.clone(),
            Container::Array(array) => array.0.borrow().parent.clone(),
        }
    }

    pub(crate) fn set_parent_link(&self, link: Option<ParentLink>) {
        match self {
            Container::Dict(dict) => dict.0.borrow_mut().parent = link,
            Container::Array(array) => array.0.borrow_mut().parent = link,
        }
    }

    /// Update the index of an array child whose siblings shifted.
    pub(crate) fn set_link_key(&self, key: SlotKey) {
        let mut link = self.parent_link();
        if let Some(link) = link.as_mut() {
            link.key = key;
        }
        self.set_parent_link(link);
    }

    pub(crate) fn mark_changed(&self) {
        match self {
            Container::Dict(dict) => dict.mark_changed(),
            Container::Array(array) => array.mark_changed(),
        }
    }

    fn holds(&self, key: &SlotKey, child: &Container) -> bool {
        match self {
            Container::Dict(dict) => dict.holds(key, child),
            Container::Array(array) => array.holds(key, child),
        }
    }

    fn detach_child(&self, key: &SlotKey, child: &Container) {
        match self {
            Container::Dict(dict) => dict.detach_child(key, child),
            Container::Array(array) => array.detach_child(key, child),
        }
    }

    /// The parent, if the back-reference is still valid.
    fn live_parent(&self) -> Option<Container> {
        let link = self.parent_link()?;
        let parent = link.parent.upgrade()?;
        parent.holds(&link.key, self).then_some(parent)
    }

    pub(crate) fn collect_pending_blobs(&self, out: &mut Vec<Blob>) {
        match self {
            Container::Dict(dict) => dict.collect_pending_blobs(out),
            Container::Array(array) => array.collect_pending_blobs(out),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tree Maintenance
// ═══════════════════════════════════════════════════════════════════

/// Notify the parent of a container that just became changed.
///
/// Stops at the first ancestor already marked changed, so the cost is
/// bounded by the distance to it, not by the size of the tree.
pub(crate) fn propagate_change(child: &Container, link: Option<ParentLink>) {
    let Some(link) = link else {
        return;
    };
    match link.parent.upgrade() {
        Some(parent) if parent.holds(&link.key, child) => parent.mark_changed(),
        _ => {
            trace!(key = %link.key, "dropping stale back-reference");
            child.set_parent_link(None);
        }
    }
}

/// Prepare `value` to be stored in `parent` at `key`.
///
/// A mutable container has at most one parent: if it currently lives
/// somewhere else, the old slot is given an independent copy and the live
/// handle moves here.
///
/// # Panics
///
/// Panics if `value` is `parent` itself or one of its ancestors.
pub(crate) fn adopt(parent: &Container, key: SlotKey, value: &Value) {
    attach(parent, key, value, false);
}

/// Like [`adopt`], for a value inserted at `key` ahead of the current
/// occupant. A container already sitting at `key` still moves: its old slot
/// shifts up and keeps a copy.
pub(crate) fn adopt_inserted(parent: &Container, key: SlotKey, value: &Value) {
    attach(parent, key, value, true);
}

fn attach(parent: &Container, key: SlotKey, value: &Value, inserting: bool) {
    let Some(child) = Container::from_value(value) else {
        return;
    };

    let mut cursor = Some(parent.clone());
    while let Some(node) = cursor {
        assert!(
            !node.same(&child),
            "cannot store a container inside itself or its own subtree"
        );
        cursor = node.live_parent();
    }

    if let Some(old) = child.parent_link() {
        let moved = inserting || !(old.parent.points_to(parent) && old.key == key);
        if moved {
            if let Some(old_parent) = old.parent.upgrade() {
                if old_parent.holds(&old.key, &child) {
                    trace!(from = %old.key, to = %key, "moving container to a new parent");
                    old_parent.detach_child(&old.key, &child);
                }
            }
        }
    }

    child.set_parent_link(Some(ParentLink {
        parent: parent.downgrade(),
        key,
    }));
}

/// Invalidate the back-reference of a value that `parent` no longer holds.
pub(crate) fn release(parent: &Container, old: &Value, replacement: Option<&Value>) {
    let Some(child) = Container::from_value(old) else {
        return;
    };
    if let Some(new) = replacement.and_then(Container::from_value) {
        if new.same(&child) {
            return;
        }
    }
    if child
        .parent_link()
        .is_some_and(|link| link.parent.points_to(parent))
    {
        child.set_parent_link(None);
    }
}

/// Turn an immutable container read out of `parent` into a mutable handle
/// attached at `key`. Other values pass through.
pub(crate) fn promote(value: Value, parent: WeakContainer, key: SlotKey) -> Value {
    let link = ParentLink { parent, key };
    match value {
        Value::Dict(view) => {
            let dict = MutableDict::from_view(view);
            dict.0.borrow_mut().parent = Some(link);
            Value::MutableDict(dict)
        }
        Value::Array(view) => {
            let array = MutableArray::from_view(view);
            array.0.borrow_mut().parent = Some(link);
            Value::MutableArray(array)
        }
        other => other,
    }
}

/// Copy a slot for a deep copy of its container: mutable children are copied
/// recursively and re-attached, everything else is shared.
pub(crate) fn copy_slot(value: &Value, parent: WeakContainer, key: SlotKey) -> Value {
    let copy = match value {
        Value::MutableDict(dict) => Value::MutableDict(dict.deep_copy()),
        Value::MutableArray(array) => Value::MutableArray(array.deep_copy()),
        other => return other.clone(),
    };
    if let Some(container) = Container::from_value(&copy) {
        container.set_parent_link(Some(ParentLink { parent, key }));
    }
    copy
}

/// Blobs with in-memory content in a slot (directly or below it).
pub(crate) fn collect_slot_blobs(value: &Value, out: &mut Vec<Blob>) {
    match value {
        Value::Blob(blob) if blob.pending_content().is_some() => out.push(blob.clone()),
        Value::MutableDict(dict) => dict.collect_pending_blobs(out),
        Value::MutableArray(array) => array.collect_pending_blobs(out),
        _ => {}
    }
}
