//! Read-only dictionary view

use std::fmt;

use crate::encoding::{empty_dict_body, ValueView, HEADER_LEN};
use crate::error::Result;
use crate::fragment::Fragment;
use crate::mutable::MutableDict;
use crate::value::{FromValue, Value};

/// A read-only dictionary backed by encoded data.
///
/// Keys iterate in the encoding's order (sorted by UTF-8 bytes), not in the
/// order they were inserted.
#[derive(Clone)]
pub struct DictView {
    view: ValueView,
}

impl DictView {
    pub(crate) fn from_view(view: ValueView) -> Self {
        Self { view }
    }

    /// An empty dictionary with its own (tiny) buffer.
    pub fn empty() -> Self {
        Self::from_view(ValueView::new(empty_dict_body().into(), HEADER_LEN))
    }

    /// The underlying node
    pub fn view(&self) -> &ValueView {
        &self.view
    }

    /// Number of entries
    pub fn count(&self) -> usize {
        self.view.count()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Look up a key. Absent keys return `None`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.view.dict_get(key)?.to_value()
    }

    /// Look up a key and convert it to a native type.
    ///
    /// Absent keys and explicit nulls read as `Ok(None)`.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(&value).map(Some),
        }
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.view.dict_get(key).is_some()
    }

    /// Keys in encoding order
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.count()).filter_map(move |i| self.view.dict_entry(i).map(|(k, _)| k))
    }

    /// Entries in encoding order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> + '_ {
        (0..self.count()).filter_map(move |i| {
            let (key, value) = self.view.dict_entry(i)?;
            Some((key, value.to_value()?))
        })
    }

    /// Start a path from `key`.
    pub fn fragment(&self, key: &str) -> Fragment {
        Fragment::new(self.get(key))
    }

    /// A copy-on-write editor over this dictionary. Nothing is copied until
    /// the first write.
    pub fn to_mutable(&self) -> MutableDict {
        MutableDict::from_view(self.clone())
    }

    /// Encoded size of this dictionary node in bytes
    pub fn encoded_len(&self) -> usize {
        self.view.byte_len().unwrap_or(0)
    }

    /// Project onto a plain `serde_json` tree.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Dict(self.clone()).to_json()
    }
}

impl PartialEq for DictView {
    fn eq(&self, other: &Self) -> bool {
        self.view.same_node(&other.view) || self.view.raw() == other.view.raw()
    }
}

impl fmt::Debug for DictView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DictView({:?})", Value::Dict(self.clone()))
    }
}
