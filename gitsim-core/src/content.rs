//! Content hashes and the block entries stored under them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;

use crate::error::{IndexError, IndexResult};

/// Number of bytes in a content digest.
pub const CONTENT_HASH_LEN: usize = 32;

/// Lowercase hex digest of some content. Only used to group and order blocks,
/// never as proof of integrity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse a hex digest, normalizing it to lowercase.
    pub fn from_hex(hex_str: &str) -> IndexResult<Self> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != CONTENT_HASH_LEN {
            return Err(IndexError::Deserialization(format!(
                "content hash must be {} bytes, got {}",
                CONTENT_HASH_LEN,
                bytes.len()
            )));
        }
        Ok(ContentHash(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContentHash {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash content with SHA-256.
pub fn content_hash(content: impl AsRef<[u8]>) -> ContentHash {
    ContentHash(hex::encode(Sha256::digest(content.as_ref())))
}

/// A staged file: where it came from and what it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub path: String,
    pub content: Vec<u8>,
}

impl BlockEntry {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        BlockEntry {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn hash(&self) -> ContentHash {
        content_hash(&self.content)
    }
}
