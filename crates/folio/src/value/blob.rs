//! Binary attachments

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

use crate::database::Database;
use crate::error::Result;

/// A binary attachment.
///
/// The document body only records the blob's metadata; the bytes live in the
/// store under the content digest. A blob created locally carries its content
/// in memory until the owning document is saved.
#[derive(Clone)]
pub struct Blob {
    inner: Arc<BlobInner>,
}

struct BlobInner {
    digest: String,
    length: u64,
    content_type: Option<String>,
    content: Option<Arc<[u8]>>,
}

impl Blob {
    /// Create a blob from in-memory content.
    pub fn new(content_type: Option<&str>, content: impl Into<Vec<u8>>) -> Self {
        let content: Arc<[u8]> = content.into().into();
        Self {
            inner: Arc::new(BlobInner {
                digest: Self::digest_of(&content),
                length: content.len() as u64,
                content_type: content_type.map(str::to_string),
                content: Some(content),
            }),
        }
    }

    /// Reference a stored blob by its metadata.
    pub fn from_metadata(
        digest: impl Into<String>,
        length: u64,
        content_type: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(BlobInner {
                digest: digest.into(),
                length,
                content_type,
                content: None,
            }),
        }
    }

    /// Compute the content digest used to key blob storage: `sha1-<base64>`.
    pub fn digest_of(content: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(content);
        format!("sha1-{}", STANDARD.encode(hasher.finalize()))
    }

    /// The content digest
    pub fn digest(&self) -> &str {
        &self.inner.digest
    }

    /// Length of the content in bytes
    pub fn length(&self) -> u64 {
        self.inner.length
    }

    /// MIME type, if known
    pub fn content_type(&self) -> Option<&str> {
        self.inner.content_type.as_deref()
    }

    /// Content held in memory (blobs created locally and not yet read back
    /// from a store).
    pub fn pending_content(&self) -> Option<&Arc<[u8]>> {
        self.inner.content.as_ref()
    }

    /// Read the content, from memory if present, otherwise from the store.
    pub fn content(&self, database: &Database) -> Result<Arc<[u8]>> {
        if let Some(content) = &self.inner.content {
            return Ok(content.clone());
        }
        Ok(database.store().read_blob(&self.inner.digest)?)
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.inner.digest == other.inner.digest
            && self.inner.length == other.inner.length
            && self.inner.content_type == other.inner.content_type
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("digest", &self.inner.digest)
            .field("length", &self.inner.length)
            .field("content_type", &self.inner.content_type)
            .finish()
    }
}
