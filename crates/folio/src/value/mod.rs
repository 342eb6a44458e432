//! Value representation for document properties

mod blob;
mod display;
mod impls;
mod json;

pub use blob::Blob;
pub use impls::FromValue;

use std::sync::Arc;

use crate::collection::{ArrayView, DictView};
use crate::mutable::{MutableArray, MutableDict};

/// A single document property value.
///
/// Values are organized into three tiers:
/// - Tier 1: Inline scalars (no allocation)
/// - Tier 2: Shared immutable payloads (strings, blobs, and containers that
///   alias into an encoded buffer)
/// - Tier 3: Materialized mutable containers, owned by exactly one parent
///
/// Cloning a container variant clones a handle, never the contents.
#[derive(Clone)]
pub enum Value {
    // ═══════════════════════════════════════════════════════════════════
    // Tier 1: Inline Scalars
    // ═══════════════════════════════════════════════════════════════════
    /// Explicit null
    Null,

    /// Boolean: `true` or `false`
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point
    Float(f64),

    // ═══════════════════════════════════════════════════════════════════
    // Tier 2: Shared Immutable Payloads
    // ═══════════════════════════════════════════════════════════════════
    /// UTF-8 string
    String(Arc<str>),

    /// Binary attachment referenced by content digest
    Blob(Blob),

    /// Read-only array backed by encoded data
    Array(ArrayView),

    /// Read-only dictionary backed by encoded data
    Dict(DictView),

    // ═══════════════════════════════════════════════════════════════════
    // Tier 3: Mutable Containers
    // ═══════════════════════════════════════════════════════════════════
    /// Copy-on-write editable array
    MutableArray(MutableArray),

    /// Copy-on-write editable dictionary
    MutableDict(MutableDict),
}
