//! Path accessors for chained navigation and assignment
//!
//! A fragment addresses one slot reached from a root by a chain of keys and
//! indices. A chain that runs into a missing or non-container value becomes
//! an *empty* fragment: reading it yields nothing, and writing to it fails
//! with [`Error::PathNotSettable`]. Nothing is created along the way.
//!
//! ```
//! use folio::{MutableDict, Value};
//!
//! let root = MutableDict::new();
//! assert!(!root.fragment("a").key("b").index(3).key("c").exists());
//! assert!(root.fragment("a").key("b").set(1).is_err());
//!
//! root.fragment("a").set(Value::dict()).unwrap();
//! root.fragment("a").key("b").set(1).unwrap();
//! assert_eq!(root.to_json(), serde_json::json!({"a": {"b": 1}}));
//! ```

use std::fmt;

use crate::error::{Error, Result};
use crate::mutable::Container;
use crate::value::{FromValue, Value};

/// Read-only path handle.
#[derive(Clone, Debug, Default)]
pub struct Fragment {
    value: Option<Value>,
}

impl Fragment {
    /// A fragment resolving to `value`.
    pub fn new(value: Option<Value>) -> Self {
        Self { value }
    }

    /// A fragment that resolves to nothing.
    pub fn empty() -> Self {
        Self { value: None }
    }

    /// Step into `key`; empty unless the current value is a dictionary.
    pub fn key(self, key: &str) -> Fragment {
        Fragment::new(self.value.and_then(|v| v.get_key(key)))
    }

    /// Step into `index`; empty unless the current value is an array with
    /// that many items.
    pub fn index(self, index: usize) -> Fragment {
        Fragment::new(self.value.and_then(|v| v.get_index(index)))
    }

    /// The resolved value
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// True if the path resolves to a value (an explicit null counts)
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// The resolved value as a native type; absent and null read as `None`.
    pub fn to<T: FromValue>(&self) -> Result<Option<T>> {
        match &self.value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some),
        }
    }
}

/// One step of a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathSegment<'a> {
    /// Dictionary key
    Key(&'a str),
    /// Array index
    Index(usize),
}

impl fmt::Display for PathSegment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{:?}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Settable path handle over a mutable tree.
///
/// Holds the container the last segment lives in, so assignment writes
/// straight into it; the write forks that container and, through the
/// parent links, marks every ancestor changed.
#[derive(Clone, Debug)]
pub struct MutableFragment<'a> {
    parent: Option<Container>,
    segment: Option<PathSegment<'a>>,
    value: Option<Value>,
}

impl<'a> MutableFragment<'a> {
    pub(crate) fn of(container: Container) -> Self {
        Self {
            value: Some(container.to_value()),
            parent: None,
            segment: None,
        }
    }

    fn step(self, segment: PathSegment<'a>) -> MutableFragment<'a> {
        let parent = match (&self.value, segment) {
            (Some(Value::MutableDict(dict)), PathSegment::Key(_)) => {
                Some(Container::Dict(dict.clone()))
            }
            (Some(Value::MutableArray(array)), PathSegment::Index(_)) => {
                Some(Container::Array(array.clone()))
            }
            _ => None,
        };
        let value = match (&parent, segment) {
            (Some(Container::Dict(dict)), PathSegment::Key(key)) => dict.get(key),
            (Some(Container::Array(array)), PathSegment::Index(index)) => array.get(index),
            _ => None,
        };
        MutableFragment {
            parent,
            segment: Some(segment),
            value,
        }
    }

    /// Step into `key`.
    pub fn key(self, key: &'a str) -> MutableFragment<'a> {
        self.step(PathSegment::Key(key))
    }

    /// Step into `index`.
    pub fn index(self, index: usize) -> MutableFragment<'a> {
        self.step(PathSegment::Index(index))
    }

    /// The resolved value
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// True if the path resolves to a value
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// True if [`set`](Self::set) can succeed: the last segment lives in an
    /// existing container.
    pub fn is_settable(&self) -> bool {
        self.parent.is_some()
    }

    /// The resolved value as a native type; absent and null read as `None`.
    pub fn to<T: FromValue>(&self) -> Result<Option<T>> {
        match &self.value {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some),
        }
    }

    fn not_settable(&self) -> Error {
        match self.segment {
            Some(segment) => Error::PathNotSettable(format!("no container holds {}", segment)),
            None => Error::PathNotSettable("the root cannot be replaced".to_string()),
        }
    }

    /// Assign to the addressed slot.
    ///
    /// Fails with [`Error::PathNotSettable`] if an intermediate segment is
    /// missing, and with [`Error::IndexOutOfBounds`] for an index past the
    /// end of an existing array.
    pub fn set(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match (&self.parent, self.segment) {
            (Some(Container::Dict(dict)), Some(PathSegment::Key(key))) => {
                dict.set(key, value.clone())
            }
            (Some(Container::Array(array)), Some(PathSegment::Index(index))) => {
                array.set(index, value.clone())?
            }
            _ => return Err(self.not_settable()),
        }
        self.value = Some(value);
        Ok(())
    }

    /// Remove the addressed slot, returning what it held. Removing an absent
    /// key or index is a no-op.
    pub fn remove(&mut self) -> Result<Option<Value>> {
        let removed = match (&self.parent, self.segment) {
            (Some(Container::Dict(dict)), Some(PathSegment::Key(key))) => dict.remove(key),
            (Some(Container::Array(array)), Some(PathSegment::Index(index))) => {
                if index < array.count() {
                    Some(array.remove_at(index)?)
                } else {
                    None
                }
            }
            _ => return Err(self.not_settable()),
        };
        self.value = None;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::MutableDict;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn root() -> MutableDict {
        MutableDict::from_json(&json!({"a": {"list": [1, {"x": true}]}, "s": "str"})).unwrap()
    }

    #[test]
    fn test_read_through_views() {
        let view = root().snapshot().unwrap();
        let leaf = view.fragment("a").key("list").index(1).key("x");
        assert_eq!(leaf.to::<bool>().unwrap(), Some(true));
        assert!(!view.fragment("a").key("missing").index(0).exists());
    }

    #[test]
    fn test_scalar_is_not_a_container() {
        let root = root();
        let mut fragment = root.fragment("s").key("deeper");
        assert!(!fragment.exists());
        assert!(matches!(fragment.set(1), Err(Error::PathNotSettable(_))));
    }

    #[test]
    fn test_last_segment_may_be_new() {
        let root = root();
        root.fragment("a").key("fresh").set("new").unwrap();
        assert_eq!(
            root.get_dict("a").unwrap().get("fresh"),
            Some(Value::string("new"))
        );
    }

    #[test]
    fn test_array_index_past_end() {
        let root = root();
        let mut fragment = root.fragment("a").key("list").index(2);
        assert!(fragment.is_settable());
        assert!(matches!(
            fragment.set(3),
            Err(Error::IndexOutOfBounds { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_set_updates_value() {
        let root = root();
        let mut fragment = root.fragment("a").key("list").index(0);
        fragment.set(10).unwrap();
        assert_eq!(fragment.value(), Some(&Value::Int(10)));
        assert_eq!(fragment.to::<i64>().unwrap(), Some(10));
    }

    #[test]
    fn test_remove() {
        let root = root();
        assert_eq!(
            root.fragment("a").key("list").index(0).remove().unwrap(),
            Some(Value::Int(1))
        );
        assert_eq!(root.fragment("nope").remove().unwrap(), None);
        assert!(root.fragment("nope").key("x").remove().is_err());
        assert_eq!(root.to_json(), json!({"a": {"list": [{"x": true}]}, "s": "str"}));
    }
}
