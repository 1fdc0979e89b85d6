//! Error types for gitsim-core index operations.
//!
//! Lookups and policy-gated removals never produce an error; these variants
//! cover API misuse (unknown ids, duplicate names), configuration problems and
//! snapshot decoding.

use thiserror::Error;

/// Error type for all index operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// A branch with this name already exists somewhere in the hierarchy
    #[error("Branch '{0}' already exists")]
    DuplicateBranch(String),

    /// A branch id that does not refer to a live node
    #[error("Unknown branch id {0}")]
    UnknownBranch(usize),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error (bincode, serde_json)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error (bincode, serde_json, hex)
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A decoded snapshot that violates the structure's invariants
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            IndexError::Deserialization(err.to_string())
        } else {
            IndexError::Serialization(err.to_string())
        }
    }
}

impl From<hex::FromHexError> for IndexError {
    fn from(err: hex::FromHexError) -> Self {
        IndexError::Deserialization(format!("Invalid hex: {}", err))
    }
}

/// Result type for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
