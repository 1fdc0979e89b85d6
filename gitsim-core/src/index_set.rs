//! The four indexes a repository owns, kept side by side.
//!
//! The structures never call into each other. `IndexSet` only sequences the
//! few operations that touch more than one of them, such as registering a
//! contributor and assigning the contributor's role.

use tracing::{debug, info};

use crate::block_index::{BlockIndex, ContentIndex};
use crate::branch::BranchHierarchy;
use crate::config::IndexConfig;
use crate::content::{BlockEntry, ContentHash};
use crate::contributor::ContributorIndex;
use crate::error::{IndexError, IndexResult};
use crate::role::RoleDirectory;
use crate::snapshot::IndexSnapshot;

/// Branch, contributor, block and role indexes of one repository.
#[derive(Debug)]
pub struct IndexSet {
    config: IndexConfig,
    pub branches: BranchHierarchy,
    pub contributors: ContributorIndex,
    pub blocks: ContentIndex,
    pub roles: RoleDirectory,
}

impl IndexSet {
    /// Create empty indexes (the branch tree holds only `main`) and assign
    /// the configured seed roles.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails validation
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;

        let mut roles = RoleDirectory::new();
        for (identity, role) in &config.seed_roles {
            roles.insert(identity, role.as_str());
        }

        let set = IndexSet {
            blocks: BlockIndex::new(config.block_min_degree)?,
            branches: BranchHierarchy::new(),
            contributors: ContributorIndex::new(),
            roles,
            config,
        };
        info!(
            min_degree = set.config.block_min_degree,
            seed_roles = set.roles.len(),
            "created index set"
        );
        Ok(set)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Hash `content` and store it under that hash. Staging identical content
    /// again replaces the stored entry.
    pub fn stage_block(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> ContentHash {
        let entry = BlockEntry::new(path, content);
        let hash = entry.hash();
        debug!(path = %entry.path, hash = %hash, "staging block");
        self.blocks.insert(hash.clone(), entry);
        hash
    }

    /// Look up a staged entry by hex hash.
    pub fn block(&self, hash: &str) -> Option<&BlockEntry> {
        self.blocks.search(hash)
    }

    /// Register a contributor and assign the contributor's role to their email.
    pub fn add_contributor(&mut self, name: &str, email: &str, role: &str) {
        self.contributors.insert(name, email, role);
        self.roles.insert(email, role);
    }

    /// Remove a contributor and the role assigned to their email. Returns
    /// false if no contributor has this name.
    pub fn remove_contributor(&mut self, name: &str) -> bool {
        match self.contributors.delete(name) {
            Some(removed) => {
                self.roles.delete(&removed.email);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            config: self.config.clone(),
            branches: self.branches.snapshot(),
            contributors: self.contributors.snapshot(),
            blocks: self.blocks.snapshot(),
            roles: self.roles.snapshot(),
        }
    }

    /// Rebuild indexes from a snapshot. Seed roles are not reapplied; the
    /// snapshot's role directory is taken as is.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` or `InvalidSnapshot` if any part is malformed
    pub fn restore(snapshot: IndexSnapshot) -> IndexResult<Self> {
        snapshot.config.validate()?;
        if snapshot.blocks.min_degree != snapshot.config.block_min_degree {
            return Err(IndexError::InvalidSnapshot(format!(
                "block index has minimum degree {} but config says {}",
                snapshot.blocks.min_degree, snapshot.config.block_min_degree
            )));
        }

        let set = IndexSet {
            branches: BranchHierarchy::from_snapshot(&snapshot.branches)?,
            contributors: ContributorIndex::from_snapshot(&snapshot.contributors),
            blocks: BlockIndex::from_snapshot(snapshot.blocks)?,
            roles: RoleDirectory::from_snapshot(&snapshot.roles)?,
            config: snapshot.config,
        };
        info!(
            branches = set.branches.branch_count(),
            contributors = set.contributors.len(),
            blocks = set.blocks.len(),
            roles = set.roles.len(),
            "restored index set"
        );
        Ok(set)
    }
}

impl Default for IndexSet {
    fn default() -> Self {
        IndexSet {
            config: IndexConfig::default(),
            branches: BranchHierarchy::new(),
            contributors: ContributorIndex::new(),
            blocks: BlockIndex::default(),
            roles: RoleDirectory::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::content_hash;

    fn populated() -> IndexSet {
        let config = IndexConfig {
            seed_roles: vec![("admin@example.com".to_string(), "admin".to_string())],
            ..IndexConfig::default()
        };
        let mut set = IndexSet::new(config).unwrap();

        let main = set.branches.root();
        let dev = set.branches.add_child(main, "dev").unwrap();
        set.branches.attach_commit(dev, "c0ffee").unwrap();

        set.add_contributor("maria", "maria@example.com", "maintainer");
        set.add_contributor("diego", "diego@example.com", "developer");
        set.add_contributor("zoe", "zoe@example.com", "guest");

        for i in 0..20 {
            set.stage_block(format!("src/file{}.rs", i), format!("fn f{}() {{}}", i));
        }
        set
    }

    #[test]
    fn test_new_applies_seed_roles() {
        let set = populated();
        assert_eq!(set.roles.search("admin@example.com"), Some("admin"));
        assert_eq!(set.branches.list_all(), vec!["main", "  dev"]);
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = IndexConfig {
            block_min_degree: 1,
            ..IndexConfig::default()
        };
        assert!(matches!(IndexSet::new(config), Err(IndexError::InvalidConfig(_))));
    }

    #[test]
    fn test_huge_degree_is_rejected_before_staging() {
        let config = IndexConfig::from_json(r#"{"block_min_degree": 18446744073709551615}"#);
        assert!(matches!(config, Err(IndexError::InvalidConfig(_))));

        let config = IndexConfig {
            block_min_degree: usize::MAX,
            ..IndexConfig::default()
        };
        assert!(matches!(IndexSet::new(config), Err(IndexError::InvalidConfig(_))));
    }

    #[test]
    fn test_stage_block() {
        let mut set = IndexSet::default();
        let hash = set.stage_block("README.md", "hello");
        assert_eq!(hash, content_hash("hello"));
        assert_eq!(set.block(hash.as_str()).unwrap().path, "README.md");

        // Same content under another path replaces the entry.
        let again = set.stage_block("COPY.md", "hello");
        assert_eq!(again, hash);
        assert_eq!(set.blocks.len(), 1);
        assert_eq!(set.block(hash.as_str()).unwrap().path, "COPY.md");
    }

    #[test]
    fn test_contributor_and_role_stay_in_step() {
        let mut set = populated();
        assert_eq!(set.contributors.find("diego").unwrap().role, "developer");
        assert_eq!(set.roles.search("diego@example.com"), Some("developer"));

        assert!(set.remove_contributor("diego"));
        assert!(set.contributors.find("diego").is_none());
        assert_eq!(set.roles.search("diego@example.com"), None);
        assert!(!set.remove_contributor("diego"));
    }

    #[test]
    fn test_snapshot_round_trip_bytes_and_json() {
        let set = populated();
        let snapshot = set.snapshot();

        let bytes = snapshot.to_bytes().unwrap();
        let decoded = IndexSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, snapshot);

        let json = snapshot.to_json().unwrap();
        let decoded = IndexSnapshot::from_json(&json).unwrap();
        assert_eq!(decoded, snapshot);

        let restored = IndexSet::restore(decoded).unwrap();
        assert_eq!(restored.branches.list_all(), set.branches.list_all());
        assert_eq!(restored.contributors.list_all(), set.contributors.list_all());
        assert_eq!(restored.blocks.len(), 20);
        assert_eq!(restored.roles.traverse_postorder(), set.roles.traverse_postorder());
        let dev = restored.branches.find_branch("dev").unwrap();
        assert_eq!(restored.branches.parent(dev), Some(restored.branches.root()));
        assert_eq!(restored.branches.commits(dev), &["c0ffee".to_string()]);
    }

    #[test]
    fn test_deep_branch_chain_survives_json() {
        let mut set = IndexSet::default();
        let mut tip = set.branches.root();
        for i in 0..200 {
            tip = set.branches.add_child(tip, format!("topic-{}", i)).unwrap();
        }

        let json = set.snapshot().to_json().unwrap();
        let restored = IndexSet::restore(IndexSnapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.branches.branch_count(), 201);
        assert_eq!(restored.branches.list_all(), set.branches.list_all());
    }

    #[test]
    fn test_restore_rejects_degree_mismatch() {
        let mut snapshot = populated().snapshot();
        snapshot.config.block_min_degree = 4;
        assert!(matches!(
            IndexSet::restore(snapshot),
            Err(IndexError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let result = IndexSnapshot::from_bytes(&[0xff, 0x01]);
        assert!(matches!(result, Err(IndexError::Deserialization(_))));
    }
}
