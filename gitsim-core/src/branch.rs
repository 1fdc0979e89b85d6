//! N-ary branch hierarchy.
//!
//! Branches live in an arena and refer to each other through [`BranchId`]s.
//! Children are owned by their parent's child list; the parent link is a plain
//! id and never keeps a node alive. Removing a branch releases its whole
//! subtree. Released slots are reused, and each reuse bumps the slot's
//! generation so ids handed out earlier stop resolving.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{IndexError, IndexResult};

/// Name of the root branch. It always exists and can never be removed.
pub const ROOT_BRANCH: &str = "main";

/// Reference to a commit recorded on a branch (commit id, usually a hex hash).
pub type CommitRef = String;

/// Handle to a node in a [`BranchHierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId {
    index: usize,
    generation: u32,
}

impl BranchId {
    /// Arena slot of this branch.
    pub fn index(self) -> usize {
        self.index
    }

    /// How many times the slot had been released before this id was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// A single branch.
#[derive(Debug, Clone)]
pub struct BranchNode {
    name: String,
    parent: Option<BranchId>,
    children: Vec<BranchId>,
    commits: Vec<CommitRef>,
    merged: bool,
}

impl BranchNode {
    fn new(name: String, parent: Option<BranchId>) -> Self {
        BranchNode {
            name,
            parent,
            children: Vec::new(),
            commits: Vec::new(),
            merged: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<BranchId> {
        self.parent
    }

    pub fn children(&self) -> &[BranchId] {
        &self.children
    }

    /// Commits attached to this branch, most recent last.
    pub fn commits(&self) -> &[CommitRef] {
        &self.commits
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<BranchNode>,
}

/// One branch in a [`BranchSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub name: String,
    pub commits: Vec<CommitRef>,
    pub merged: bool,
    /// Distance from the root; 0 for `main`
    pub depth: usize,
}

/// Serialized form of a hierarchy: every branch in preorder, tagged with its
/// depth.
///
/// Parent links are not stored; [`BranchHierarchy::from_snapshot`] rebuilds
/// them from the depths. The list is flat so arbitrarily deep hierarchies
/// decode without hitting serializer recursion limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSnapshot {
    pub branches: Vec<BranchRecord>,
}

/// Tree of named branches rooted at [`ROOT_BRANCH`].
#[derive(Debug, Clone)]
pub struct BranchHierarchy {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
}

impl BranchHierarchy {
    /// Create a hierarchy holding only the root branch.
    pub fn new() -> Self {
        BranchHierarchy {
            slots: vec![Slot {
                generation: 0,
                node: Some(BranchNode::new(ROOT_BRANCH.to_string(), None)),
            }],
            free: Vec::new(),
            live: 1,
        }
    }

    /// Id of the root branch.
    pub fn root(&self) -> BranchId {
        BranchId {
            index: 0,
            generation: 0,
        }
    }

    /// Number of live branches, root included.
    pub fn branch_count(&self) -> usize {
        self.live
    }

    /// Look up a branch by id. Returns None for ids of removed branches.
    pub fn branch(&self, id: BranchId) -> Option<&BranchNode> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn branch_mut(&mut self, id: BranchId) -> IndexResult<&mut BranchNode> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(IndexError::UnknownBranch(id.index))
    }

    pub fn parent(&self, id: BranchId) -> Option<BranchId> {
        self.branch(id).and_then(BranchNode::parent)
    }

    pub fn children(&self, id: BranchId) -> &[BranchId] {
        self.branch(id).map(BranchNode::children).unwrap_or(&[])
    }

    pub fn commits(&self, id: BranchId) -> &[CommitRef] {
        self.branch(id).map(BranchNode::commits).unwrap_or(&[])
    }

    /// Place `node` in a free slot, or grow the arena if there is none.
    fn allocate(&mut self, node: BranchNode) -> BranchId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                BranchId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                BranchId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Free the slot behind `id`, returning the node it held.
    fn release(&mut self, id: BranchId) -> Option<BranchNode> {
        let slot = self
            .slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    /// Create branch `name` under `parent`.
    ///
    /// # Errors
    ///
    /// `DuplicateBranch` if the name is already used anywhere in the tree,
    /// `UnknownBranch` if `parent` was removed or never existed.
    pub fn add_child(&mut self, parent: BranchId, name: impl Into<String>) -> IndexResult<BranchId> {
        let name = name.into();
        if self.branch(parent).is_none() {
            return Err(IndexError::UnknownBranch(parent.index));
        }
        if self.find_branch(&name).is_some() {
            return Err(IndexError::DuplicateBranch(name));
        }

        let id = self.allocate(BranchNode::new(name, Some(parent)));
        self.branch_mut(parent)?.children.push(id);
        debug!(parent = parent.index, id = id.index, generation = id.generation, "added branch");
        Ok(id)
    }

    /// Depth-first search by name: a node before its children, children in
    /// insertion order.
    pub fn find_branch(&self, name: &str) -> Option<BranchId> {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = self.branch(id)?;
            if node.name == name {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Remove the direct child `name` of `parent` together with its subtree.
    ///
    /// Only merged branches may be removed. Returns false when `parent` has no
    /// such child or the child is not merged.
    pub fn remove_child(&mut self, parent: BranchId, name: &str) -> bool {
        let Some(parent_node) = self.branch(parent) else {
            return false;
        };
        let found = parent_node.children.iter().enumerate().find_map(|(pos, &child)| {
            self.branch(child)
                .filter(|node| node.name == name)
                .map(|node| (pos, child, node.merged))
        });

        let (pos, child) = match found {
            Some((pos, child, true)) => (pos, child),
            Some((_, _, false)) => {
                debug!(branch = name, "refusing to remove unmerged branch");
                return false;
            }
            None => return false,
        };

        if let Ok(parent_node) = self.branch_mut(parent) {
            parent_node.children.remove(pos);
        }

        let mut released = 0;
        let mut stack = vec![child];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.release(id) {
                stack.extend(node.children);
                released += 1;
            }
        }
        debug!(branch = name, released, "removed branch");
        true
    }

    /// Append a commit reference to a branch.
    pub fn attach_commit(&mut self, id: BranchId, commit: impl Into<CommitRef>) -> IndexResult<()> {
        self.branch_mut(id)?.commits.push(commit.into());
        Ok(())
    }

    /// Set or clear the merged flag that gates removal.
    pub fn set_merged(&mut self, id: BranchId, merged: bool) -> IndexResult<()> {
        self.branch_mut(id)?.merged = merged;
        Ok(())
    }

    /// Live branches in preorder with their depth.
    fn preorder(&self) -> Vec<(&BranchNode, usize)> {
        let mut result = Vec::with_capacity(self.live);
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.branch(id) else {
                continue;
            };
            result.push((node, depth));
            stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        }
        result
    }

    /// All branch names in preorder, indented two spaces per level.
    pub fn list_all(&self) -> Vec<String> {
        self.preorder()
            .into_iter()
            .map(|(node, depth)| format!("{}{}", "  ".repeat(depth), node.name))
            .collect()
    }

    /// Dump the hierarchy as a depth-tagged preorder list.
    pub fn snapshot(&self) -> BranchSnapshot {
        let branches = self
            .preorder()
            .into_iter()
            .map(|(node, depth)| BranchRecord {
                name: node.name.clone(),
                commits: node.commits.clone(),
                merged: node.merged,
                depth,
            })
            .collect();
        BranchSnapshot { branches }
    }

    /// Rebuild a hierarchy, recomputing parent links from the record depths.
    ///
    /// # Errors
    ///
    /// `InvalidSnapshot` if the first record is not a depth-0 [`ROOT_BRANCH`],
    /// a later record is not strictly below the root or skips a level, or a
    /// name repeats.
    pub fn from_snapshot(snapshot: &BranchSnapshot) -> IndexResult<Self> {
        let mut records = snapshot.branches.iter();
        let root = match records.next() {
            Some(root) if root.name == ROOT_BRANCH && root.depth == 0 => root,
            Some(root) => {
                return Err(IndexError::InvalidSnapshot(format!(
                    "root branch must be '{}' at depth 0, found '{}' at depth {}",
                    ROOT_BRANCH, root.name, root.depth
                )))
            }
            None => return Err(IndexError::InvalidSnapshot("no branches".to_string())),
        };

        let mut hierarchy = BranchHierarchy::new();
        let main = hierarchy.root();
        hierarchy.branch_mut(main)?.commits = root.commits.clone();
        hierarchy.branch_mut(main)?.merged = root.merged;

        let mut seen = HashSet::from([ROOT_BRANCH]);
        // Ids of the current record's ancestors, indexed by depth.
        let mut path = vec![main];

        for record in records {
            if record.depth == 0 || record.depth > path.len() {
                return Err(IndexError::InvalidSnapshot(format!(
                    "branch '{}' at depth {} does not follow a branch at depth {}",
                    record.name,
                    record.depth,
                    record.depth.saturating_sub(1)
                )));
            }
            if !seen.insert(record.name.as_str()) {
                return Err(IndexError::InvalidSnapshot(format!(
                    "duplicate branch name '{}'",
                    record.name
                )));
            }

            path.truncate(record.depth);
            let parent = path[record.depth - 1];
            let mut node = BranchNode::new(record.name.clone(), Some(parent));
            node.commits = record.commits.clone();
            node.merged = record.merged;
            let id = hierarchy.allocate(node);
            hierarchy.branch_mut(parent)?.children.push(id);
            path.push(id);
        }

        Ok(hierarchy)
    }
}

impl Default for BranchHierarchy {
    fn default() -> Self {
        Self::new()
    }
}
