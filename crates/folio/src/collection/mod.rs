//! Immutable containers over encoded data
//!
//! [`ArrayView`] and [`DictView`] are read-only façades over a node of an
//! encoded buffer. They are cheap to clone, share their buffer with every
//! other view of the same body, and are `Send + Sync`.

mod array;
mod dict;

pub use array::ArrayView;
pub use dict::DictView;
