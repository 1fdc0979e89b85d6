//! # gitsim-core
//!
//! Ordered and self-balancing index trees behind a simulated version-control
//! engine's bookkeeping:
//!
//! - [`BranchHierarchy`]: n-ary tree of named branches with commit references
//! - [`ContributorIndex`]: unbalanced binary search tree of contributors
//! - [`BlockIndex`]: B-tree of content blocks keyed by content hash
//! - [`RoleDirectory`]: AVL tree of role assignments keyed by user identity
//!
//! The structures are independent, single-threaded and do no I/O.
//! [`IndexSet`] owns one of each for a repository and snapshots them together.

pub mod block_index;
pub mod branch;
pub mod config;
pub mod content;
pub mod contributor;
pub mod error;
pub mod index_set;
pub mod role;
pub mod snapshot;
pub mod stats;

// Re-export commonly used types
pub use block_index::{BlockIndex, BlockNode, BlockSnapshot, ContentIndex, DEFAULT_MIN_DEGREE};
pub use branch::{BranchHierarchy, BranchId, BranchNode, BranchRecord, BranchSnapshot, CommitRef, ROOT_BRANCH};
pub use config::{IndexConfig, MAX_BLOCK_DEGREE, MIN_BLOCK_DEGREE};
pub use content::{content_hash, BlockEntry, ContentHash};
pub use contributor::{Contributor, ContributorIndex, ContributorNode};
pub use error::{IndexError, IndexResult};
pub use index_set::IndexSet;
pub use role::{RoleDirectory, RoleNode, RoleSnapshot};
pub use snapshot::IndexSnapshot;
pub use stats::{BlockIndexStats, Histogram};
