//! Read-only array view

use std::fmt;

use crate::encoding::ValueView;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::mutable::MutableArray;
use crate::value::{FromValue, Value};

/// A read-only array backed by encoded data.
#[derive(Clone)]
pub struct ArrayView {
    view: ValueView,
}

impl ArrayView {
    pub(crate) fn from_view(view: ValueView) -> Self {
        Self { view }
    }

    /// The underlying node
    pub fn view(&self) -> &ValueView {
        &self.view
    }

    /// Number of items
    pub fn count(&self) -> usize {
        self.view.count()
    }

    /// True if there are no items
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Item at `index`; `None` past the end.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.view.array_get(index)?.to_value()
    }

    /// Item at `index`, failing with [`Error::IndexOutOfBounds`] past the end.
    pub fn get_checked(&self, index: usize) -> Result<Value> {
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

    /// Items in order
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.count()).filter_map(move |i| self.get(i))
    }

    /// Start a path from `index`.
    pub fn fragment(&self, index: usize) -> Fragment {
        Fragment::new(self.get(index))
    }

    /// A copy-on-write editor over this array.
    pub fn to_mutable(&self) -> MutableArray {
        MutableArray::from_view(self.clone())
    }

    /// Project onto a plain `serde_json` tree.
    pub fn to_json(&self) -> serde_json::Value {
        Value::Array(self.clone()).to_json()
    }
}

impl PartialEq for ArrayView {
    fn eq(&self, other: &Self) -> bool {
        self.view.same_node(&other.view) || self.view.raw() == other.view.raw()
    }
}

impl fmt::Debug for ArrayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayView({:?})", Value::Array(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::MutableDict;

    fn numbers() -> ArrayView {
        let dict = MutableDict::new();
        dict.set("n", Value::array(vec![Value::Int(10), Value::Int(20), Value::Null]));
        let root = dict.snapshot().unwrap();
        root.get_as::<ArrayView>("n").unwrap().unwrap()
    }

    #[test]
    fn test_index_access() {
        let items = numbers();
        assert_eq!(items.count(), 3);
        assert_eq!(items.get(1), Some(Value::Int(20)));
        assert_eq!(items.get(3), None);
        assert!(matches!(
            items.get_checked(3),
            Err(Error::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_typed_index_access() {
        let items = numbers();
        assert_eq!(items.get_as::<i64>(0).unwrap(), Some(10));
        assert_eq!(items.get_as::<i64>(2).unwrap(), None);
        assert!(items.get_as::<String>(0).is_err());
    }

    #[test]
    fn test_iter_and_json() {
        let items = numbers();
        assert_eq!(items.iter().count(), 3);
        assert_eq!(items.to_json(), serde_json::json!([10, 20, null]));
    }
}
