//! Whole-repository snapshots of the four indexes.
//!
//! Snapshots encode with bincode for compact storage and with serde_json for
//! inspection. Decoding only checks the encoding; structural checks happen in
//! [`IndexSet::restore`](crate::IndexSet::restore).

use serde::{Deserialize, Serialize};

use crate::block_index::BlockSnapshot;
use crate::branch::BranchSnapshot;
use crate::config::IndexConfig;
use crate::content::{BlockEntry, ContentHash};
use crate::contributor::Contributor;
use crate::error::{IndexError, IndexResult};
use crate::role::RoleSnapshot;

/// Serialized state of an [`IndexSet`](crate::IndexSet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub config: IndexConfig,
    pub branches: BranchSnapshot,
    /// Contributor records in preorder
    pub contributors: Vec<Contributor>,
    pub blocks: BlockSnapshot<ContentHash, BlockEntry>,
    pub roles: Option<Box<RoleSnapshot>>,
}

impl IndexSnapshot {
    /// Encode with bincode.
    pub fn to_bytes(&self) -> IndexResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from bincode.
    pub fn from_bytes(data: &[u8]) -> IndexResult<Self> {
        bincode::deserialize(data).map_err(|err| IndexError::Deserialization(err.to_string()))
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> IndexResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> IndexResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
