//! Configuration for an [`IndexSet`](crate::IndexSet).

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Smallest minimum degree for which a B-tree is well formed.
pub const MIN_BLOCK_DEGREE: usize = 2;

/// Largest accepted minimum degree. Nodes hold up to `2t - 1` keys, so the
/// bound also keeps that arithmetic far from overflow.
pub const MAX_BLOCK_DEGREE: usize = 1024;

/// Tunables for the index structures owned by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Minimum degree `t` of the block index
    #[serde(default = "default_block_min_degree")]
    pub block_min_degree: usize,
    /// `(identity, role)` pairs assigned when the index set is created
    #[serde(default)]
    pub seed_roles: Vec<(String, String)>,
}

fn default_block_min_degree() -> usize {
    3
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            block_min_degree: default_block_min_degree(),
            seed_roles: Vec::new(),
        }
    }
}

impl IndexConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> IndexResult<Self> {
        let config: IndexConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> IndexResult<()> {
        if !(MIN_BLOCK_DEGREE..=MAX_BLOCK_DEGREE).contains(&self.block_min_degree) {
            return Err(IndexError::InvalidConfig(format!(
                "block_min_degree must be between {} and {}, got {}",
                MIN_BLOCK_DEGREE, MAX_BLOCK_DEGREE, self.block_min_degree
            )));
        }
        if let Some((identity, _)) = self.seed_roles.iter().find(|(id, _)| id.is_empty()) {
            return Err(IndexError::InvalidConfig(format!(
                "seed role identity must not be empty (got {:?})",
                identity
            )));
        }
        Ok(())
    }
}
