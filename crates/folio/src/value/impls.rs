//! Value trait implementations: constructors, predicates, extractors, From traits, PartialEq

use std::sync::Arc;

use super::*;
use crate::error::{type_name, Error, Result};

// ═══════════════════════════════════════════════════════════════════
// Convenience Constructors
// ═══════════════════════════════════════════════════════════════════

impl Value {
    /// Create a string value
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    /// Create a new mutable array value from items
    pub fn array(items: Vec<Value>) -> Self {
        Value::MutableArray(MutableArray::from_values(items))
    }

    /// Create a new, empty mutable dictionary value
    pub fn dict() -> Self {
        Value::MutableDict(MutableDict::new())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Type Predicates
    // ═══════════════════════════════════════════════════════════════════

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if value is numeric (integer or float)
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Check if value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if value is a blob
    pub fn is_blob(&self) -> bool {
        matches!(self, Value::Blob(_))
    }

    /// Check if value is an array, immutable or mutable
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_) | Value::MutableArray(_))
    }

    /// Check if value is a dictionary, immutable or mutable
    pub fn is_dict(&self) -> bool {
        matches!(self, Value::Dict(_) | Value::MutableDict(_))
    }

    /// Check if value is a materialized, editable container
    pub fn is_mutable(&self) -> bool {
        matches!(self, Value::MutableArray(_) | Value::MutableDict(_))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Extractors (return Option for safe access)
    // ═══════════════════════════════════════════════════════════════════

    /// Extract boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract as i64 (floats with no fractional part convert)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    /// Extract as f64 (integers widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Extract string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract blob
    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Extract an editable dictionary handle
    pub fn as_mutable_dict(&self) -> Option<&MutableDict> {
        match self {
            Value::MutableDict(d) => Some(d),
            _ => None,
        }
    }

    /// Extract an editable array handle
    pub fn as_mutable_array(&self) -> Option<&MutableArray> {
        match self {
            Value::MutableArray(a) => Some(a),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Navigation
    // ═══════════════════════════════════════════════════════════════════

    /// Look up `key` if this value is a dictionary.
    ///
    /// Nested containers read out of a mutable dictionary come back as
    /// mutable handles attached to it.
    pub fn get_key(&self, key: &str) -> Option<Value> {
        match self {
            Value::Dict(d) => d.get(key),
            Value::MutableDict(d) => d.get(key),
            _ => None,
        }
    }

    /// Look up `index` if this value is an array.
    pub fn get_index(&self, index: usize) -> Option<Value> {
        match self {
            Value::Array(a) => a.get(index),
            Value::MutableArray(a) => a.get(index),
            _ => None,
        }
    }

    /// Number of items if this value is a container.
    pub fn count(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.count()),
            Value::Dict(d) => Some(d.count()),
            Value::MutableArray(a) => Some(a.count()),
            Value::MutableDict(d) => Some(d.count()),
            _ => None,
        }
    }

    /// Read this value as a native type.
    pub fn to<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }

    /// Array items without promoting nested containers.
    pub(crate) fn peek_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(a) => Some(a.iter().collect()),
            Value::MutableArray(a) => Some(a.peek_items()),
            _ => None,
        }
    }

    /// Dictionary entries sorted by key, without promoting nested containers.
    pub(crate) fn peek_entries(&self) -> Option<Vec<(String, Value)>> {
        let mut entries: Vec<(String, Value)> = match self {
            Value::Dict(d) => d.iter().map(|(k, v)| (k.to_string(), v)).collect(),
            Value::MutableDict(d) => d.peek_entries(),
            _ => return None,
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Some(entries)
    }
}

// ═══════════════════════════════════════════════════════════════════
// PartialEq Implementation
// ═══════════════════════════════════════════════════════════════════

/// Structural equality: an immutable container equals a mutable one with the
/// same contents, and dictionary comparison ignores insertion order. Floats
/// compare by bit pattern, so NaN equals itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            _ if self.is_array() && other.is_array() => self.peek_items() == other.peek_items(),
            _ if self.is_dict() && other.is_dict() => self.peek_entries() == other.peek_entries(),
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Blob> for Value {
    fn from(b: Blob) -> Self {
        Value::Blob(b)
    }
}

impl From<ArrayView> for Value {
    fn from(a: ArrayView) -> Self {
        Value::Array(a)
    }
}

impl From<DictView> for Value {
    fn from(d: DictView) -> Self {
        Value::Dict(d)
    }
}

impl From<MutableArray> for Value {
    fn from(a: MutableArray) -> Self {
        Value::MutableArray(a)
    }
}

impl From<MutableDict> for Value {
    fn from(d: MutableDict) -> Self {
        Value::MutableDict(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Typed Coercion
// ═══════════════════════════════════════════════════════════════════

/// Conversion from a stored [`Value`] into a native type.
///
/// Fails with [`Error::TypeMismatch`] when the stored value has an
/// incompatible shape.
pub trait FromValue: Sized {
    /// Convert, or report the mismatch
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::TypeMismatch {
        expected,
        got: type_name(value),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("integer", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| mismatch("32-bit integer", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("float", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl FromValue for Blob {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_blob().cloned().ok_or_else(|| mismatch("blob", value))
    }
}

impl FromValue for DictView {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Dict(d) => Ok(d.clone()),
            other => Err(mismatch("immutable dictionary", other)),
        }
    }
}

impl FromValue for ArrayView {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(a) => Ok(a.clone()),
            other => Err(mismatch("immutable array", other)),
        }
    }
}

/// Mutable handles are returned as-is; an immutable dictionary becomes a
/// detached copy-on-write editor over the same data.
impl FromValue for MutableDict {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::MutableDict(d) => Ok(d.clone()),
            Value::Dict(d) => Ok(d.to_mutable()),
            other => Err(mismatch("dictionary", other)),
        }
    }
}

impl FromValue for MutableArray {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::MutableArray(a) => Ok(a.clone()),
            Value::Array(a) => Ok(a.to_mutable()),
            other => Err(mismatch("array", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.to_json())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_float_reads_as_integer() {
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
    }

    #[test]
    fn test_coercion_mismatch() {
        let err = Value::string("ten").to::<i64>().unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: "integer",
                got: "string"
            }
        ));
    }

    #[test]
    fn test_option_coercion_accepts_null() {
        assert_eq!(Value::Null.to::<Option<i64>>().unwrap(), None);
        assert_eq!(Value::Int(4).to::<Option<i64>>().unwrap(), Some(4));
    }

    #[test]
    fn test_floats_compare_bitwise() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn test_int_and_float_are_distinct() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }
}
