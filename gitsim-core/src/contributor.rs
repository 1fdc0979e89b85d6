//! Contributor directory backed by an unbalanced binary search tree.
//!
//! Names order the tree; equal names are routed to the right subtree, so a
//! repeated insert adds a second node instead of replacing the first. The tree
//! is never rebalanced, which means sorted input produces a chain as deep as the
//! tree is large. Every walk here is iterative for that reason.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

type Link = Option<Box<ContributorNode>>;

/// A contributor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    pub role: String,
}

impl Contributor {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: impl Into<String>) -> Self {
        Contributor {
            name: name.into(),
            email: email.into(),
            role: role.into(),
        }
    }
}

/// BST node owning its two subtrees.
#[derive(Debug, Clone)]
pub struct ContributorNode {
    pub contributor: Contributor,
    pub left: Link,
    pub right: Link,
}

impl ContributorNode {
    pub fn new(contributor: Contributor) -> Self {
        ContributorNode {
            contributor,
            left: None,
            right: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.contributor.name
    }

    /// Delete `name` from the subtree rooted at `self` and return the new
    /// subtree root, which is None once the last node is gone.
    pub fn delete(self: Box<Self>, name: &str) -> Link {
        let mut root = Some(self);
        remove(&mut root, name);
        root
    }
}

/// Walk from `slot` to the link holding `name`, or to the empty link where it
/// would be inserted.
fn locate<'a>(mut slot: &'a mut Link, name: &str) -> &'a mut Link {
    loop {
        let go_left = match slot.as_deref() {
            Some(node) if node.name() != name => name < node.name(),
            _ => return slot,
        };
        if let Some(node) = slot {
            slot = if go_left { &mut node.left } else { &mut node.right };
        }
    }
}

/// Detach the leftmost node under `slot`, splicing its right child into its
/// place.
fn take_min(mut slot: &mut Link) -> Link {
    while slot.as_ref().is_some_and(|node| node.left.is_some()) {
        slot = match slot {
            Some(node) => &mut node.left,
            None => return None,
        };
    }
    let mut min = slot.take()?;
    *slot = min.right.take();
    Some(min)
}

/// Remove the first node named `name` reachable from `root`. Returns the
/// removed record.
fn remove(root: &mut Link, name: &str) -> Option<Contributor> {
    let slot = locate(root, name);
    let mut node = slot.take()?;

    match (node.left.take(), node.right.take()) {
        (None, None) => {}
        (Some(child), None) | (None, Some(child)) => *slot = Some(child),
        (Some(left), Some(right)) => {
            node.left = Some(left);
            node.right = Some(right);
            let removed = match take_min(&mut node.right) {
                Some(successor) => std::mem::replace(&mut node.contributor, successor.contributor),
                None => unreachable!("right subtree is non-empty"),
            };
            *slot = Some(node);
            return Some(removed);
        }
    }
    Some(node.contributor)
}

/// Contributor directory keyed by name.
#[derive(Debug, Default)]
pub struct ContributorIndex {
    root: Link,
    len: usize,
}

impl ContributorIndex {
    pub fn new() -> Self {
        ContributorIndex { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<&ContributorNode> {
        self.root.as_deref()
    }

    /// Insert a contributor. Equal names go to the right subtree.
    pub fn insert(&mut self, name: impl Into<String>, email: impl Into<String>, role: impl Into<String>) {
        let contributor = Contributor::new(name, email, role);
        debug!(name = %contributor.name, role = %contributor.role, "inserting contributor");

        let mut slot = &mut self.root;
        while let Some(node) = slot {
            slot = if contributor.name < node.contributor.name {
                &mut node.left
            } else {
                &mut node.right
            };
        }
        *slot = Some(Box::new(ContributorNode::new(contributor)));
        self.len += 1;
    }

    /// Exact-match lookup. The first node on the search path wins.
    pub fn find(&self, name: &str) -> Option<&Contributor> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match name.cmp(node.name()) {
                Ordering::Equal => return Some(&node.contributor),
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
            };
        }
        None
    }

    /// Remove a contributor by name, replacing a two-child node with its
    /// in-order successor. Absent names leave the tree untouched.
    pub fn delete(&mut self, name: &str) -> Option<Contributor> {
        let removed = remove(&mut self.root, name)?;
        self.len -= 1;
        debug!(name, "deleted contributor");
        Some(removed)
    }

    /// All contributors in preorder (node, then left subtree, then right).
    ///
    /// Preorder only matches alphabetical order for some tree shapes. Callers
    /// depend on this exact sequence, so it is not an inorder walk.
    pub fn list_all(&self) -> Vec<&Contributor> {
        let mut result = Vec::with_capacity(self.len);
        let mut stack: Vec<&ContributorNode> = self.root.as_deref().into_iter().collect();
        while let Some(node) = stack.pop() {
            result.push(&node.contributor);
            stack.extend(node.right.as_deref());
            stack.extend(node.left.as_deref());
        }
        result
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack: Vec<(&ContributorNode, usize)> =
            self.root.as_deref().map(|node| (node, 1)).into_iter().collect();
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(node.left.as_deref().map(|child| (child, depth + 1)));
            stack.extend(node.right.as_deref().map(|child| (child, depth + 1)));
        }
        max
    }

    /// Check BST ordering for every node: left names strictly less, right
    /// names greater or equal.
    pub fn validate(&self) -> Result<(), String> {
        let mut count = 0;
        // (node, inclusive lower bound, exclusive upper bound)
        let mut stack: Vec<(&ContributorNode, Option<&str>, Option<&str>)> =
            self.root.as_deref().map(|node| (node, None, None)).into_iter().collect();
        while let Some((node, lower, upper)) = stack.pop() {
            count += 1;
            let name = node.name();
            if lower.is_some_and(|lower| name < lower) {
                return Err(format!("Contributor '{}' is left of its lower bound {:?}", name, lower));
            }
            if upper.is_some_and(|upper| name >= upper) {
                return Err(format!("Contributor '{}' is not below its upper bound {:?}", name, upper));
            }
            stack.extend(node.left.as_deref().map(|child| (child, lower, Some(name))));
            stack.extend(node.right.as_deref().map(|child| (child, Some(name), upper)));
        }
        if count != self.len {
            return Err(format!("Tree holds {} nodes but len is {}", count, self.len));
        }
        Ok(())
    }

    /// Preorder dump of every record. Re-inserting the records in this order
    /// into an empty index rebuilds the same shape.
    pub fn snapshot(&self) -> Vec<Contributor> {
        self.list_all().into_iter().cloned().collect()
    }

    pub fn from_snapshot(records: &[Contributor]) -> Self {
        let mut index = ContributorIndex::new();
        for record in records {
            index.insert(record.name.clone(), record.email.clone(), record.role.clone());
        }
        index
    }
}

impl Drop for ContributorIndex {
    fn drop(&mut self) {
        let mut stack: Vec<Box<ContributorNode>> = self.root.take().into_iter().collect();
        while let Some(mut node) = stack.pop() {
            stack.extend(node.left.take());
            stack.extend(node.right.take());
        }
    }
}
