//! Native projection: conversion to and from `serde_json` trees

use serde_json::{json, Map, Number};

use super::*;

/// Marker property identifying a blob in the JSON projection.
pub(crate) const BLOB_TYPE_KEY: &str = "@type";
pub(crate) const BLOB_TYPE: &str = "blob";

impl Value {
    /// Project this value onto a plain `serde_json` tree.
    ///
    /// Non-finite floats become `null`; blobs become metadata objects tagged
    /// with `"@type": "blob"`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Blob(b) => blob_to_json(b),
            Value::Array(_) | Value::MutableArray(_) => serde_json::Value::Array(
                self.peek_items()
                    .unwrap_or_default()
                    .iter()
                    .map(Value::to_json)
                    .collect(),
            ),
            Value::Dict(_) | Value::MutableDict(_) => serde_json::Value::Object(
                self.peek_entries()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Build a materialized value tree from JSON.
    ///
    /// Objects become [`MutableDict`]s, arrays become [`MutableArray`]s, and
    /// objects shaped like a blob projection become [`Blob`] references.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => match blob_from_json(map) {
                Some(blob) => Value::Blob(blob),
                None => Value::MutableDict(MutableDict::from_json_map(map)),
            },
        }
    }
}

fn blob_to_json(blob: &Blob) -> serde_json::Value {
    let mut obj = json!({
        BLOB_TYPE_KEY: BLOB_TYPE,
        "digest": blob.digest(),
        "length": blob.length(),
    });
    if let Some(content_type) = blob.content_type() {
        obj["content_type"] = serde_json::Value::String(content_type.to_string());
    }
    obj
}

fn blob_from_json(map: &Map<String, serde_json::Value>) -> Option<Blob> {
    if map.get(BLOB_TYPE_KEY)?.as_str()? != BLOB_TYPE {
        return None;
    }
    let digest = map.get("digest")?.as_str()?;
    let length = map.get("length")?.as_u64()?;
    let content_type = map
        .get("content_type")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(Blob::from_metadata(digest, length, content_type))
}
