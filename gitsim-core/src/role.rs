//! Role directory: an AVL tree mapping user identities to role labels.
//!
//! Heights are cached per node and every insert or delete rebalances the
//! nodes on its path, so the balance factor of every node stays within one.

use serde::{Deserialize, Serialize};
use std::cmp::{self, Ordering};
use tracing::{debug, trace};

use crate::error::{IndexError, IndexResult};

type Link = Option<Box<RoleNode>>;

/// AVL node.
#[derive(Debug, Clone)]
pub struct RoleNode {
    pub key: String,
    pub value: String,
    height: usize,
    left: Link,
    right: Link,
}

impl RoleNode {
    fn new(key: String, value: String) -> Self {
        RoleNode {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn left(&self) -> Option<&RoleNode> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&RoleNode> {
        self.right.as_deref()
    }

    /// height(left) - height(right)
    pub fn balance(&self) -> isize {
        height(&self.left) as isize - height(&self.right) as isize
    }

    fn update_height(&mut self) {
        self.height = 1 + cmp::max(height(&self.left), height(&self.right));
    }
}

fn height(link: &Link) -> usize {
    link.as_ref().map_or(0, |node| node.height)
}

fn balance_of(link: &Link) -> isize {
    link.as_ref().map_or(0, |node| node.balance())
}

fn rotate_right(mut y: Box<RoleNode>) -> Box<RoleNode> {
    let Some(mut x) = y.left.take() else {
        return y;
    };
    y.left = x.right.take();
    y.update_height();
    x.right = Some(y);
    x.update_height();
    trace!(pivot = %x.key, "rotate right");
    x
}

fn rotate_left(mut x: Box<RoleNode>) -> Box<RoleNode> {
    let Some(mut y) = x.right.take() else {
        return x;
    };
    x.right = y.left.take();
    x.update_height();
    y.left = Some(x);
    y.update_height();
    trace!(pivot = %y.key, "rotate left");
    y
}

fn insert(link: Link, key: &str, value: String, replaced: &mut Option<String>) -> Box<RoleNode> {
    let mut node = match link {
        None => return Box::new(RoleNode::new(key.to_string(), value)),
        Some(node) => node,
    };

    match key.cmp(node.key.as_str()) {
        Ordering::Less => node.left = Some(insert(node.left.take(), key, value, replaced)),
        Ordering::Greater => node.right = Some(insert(node.right.take(), key, value, replaced)),
        Ordering::Equal => {
            *replaced = Some(std::mem::replace(&mut node.value, value));
            return node;
        }
    }

    node.update_height();
    let balance = node.balance();

    if balance > 1 {
        let left_key_smaller = node.left.as_ref().is_some_and(|left| key < left.key.as_str());
        if !left_key_smaller {
            node.left = node.left.take().map(rotate_left);
        }
        return rotate_right(node);
    }
    if balance < -1 {
        let right_key_larger = node.right.as_ref().is_some_and(|right| key > right.key.as_str());
        if !right_key_larger {
            node.right = node.right.take().map(rotate_right);
        }
        return rotate_left(node);
    }
    node
}

/// Restore the balance of `node` after a deletion below it.
fn rebalance(mut node: Box<RoleNode>) -> Box<RoleNode> {
    node.update_height();
    let balance = node.balance();

    if balance > 1 {
        if balance_of(&node.left) < 0 {
            node.left = node.left.take().map(rotate_left);
        }
        return rotate_right(node);
    }
    if balance < -1 {
        if balance_of(&node.right) > 0 {
            node.right = node.right.take().map(rotate_right);
        }
        return rotate_left(node);
    }
    node
}

/// Detach the minimum node of a subtree. Returns the remaining subtree and the
/// detached node.
fn take_min(mut node: Box<RoleNode>) -> (Link, Box<RoleNode>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (rest, node)
        }
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        }
    }
}

fn delete(link: Link, key: &str, removed: &mut Option<String>) -> Link {
    let mut node = link?;

    match key.cmp(node.key.as_str()) {
        Ordering::Less => node.left = delete(node.left.take(), key, removed),
        Ordering::Greater => node.right = delete(node.right.take(), key, removed),
        Ordering::Equal => {
            let (left, right) = (node.left.take(), node.right.take());
            let (left, right) = match (left, right) {
                (None, right) => {
                    *removed = Some(node.value);
                    return right;
                }
                (left, None) => {
                    *removed = Some(node.value);
                    return left;
                }
                (Some(left), Some(right)) => (left, right),
            };

            let (rest, mut successor) = take_min(right);
            successor.left = Some(left);
            successor.right = rest;
            *removed = Some(node.value);
            return Some(rebalance(successor));
        }
    }

    Some(rebalance(node))
}

fn postorder<'a>(link: &'a Link, out: &mut Vec<(&'a str, &'a str)>) {
    if let Some(node) = link {
        postorder(&node.left, out);
        postorder(&node.right, out);
        out.push((node.key.as_str(), node.value.as_str()));
    }
}

/// Check ordering, cached heights and balance. Returns the subtree height.
fn validate(link: &Link, lower: Option<&str>, upper: Option<&str>) -> Result<usize, String> {
    let Some(node) = link else {
        return Ok(0);
    };
    if lower.is_some_and(|lower| node.key.as_str() <= lower)
        || upper.is_some_and(|upper| node.key.as_str() >= upper)
    {
        return Err(format!("Key '{}' is out of order", node.key));
    }
    let left = validate(&node.left, lower, Some(node.key.as_str()))?;
    let right = validate(&node.right, Some(node.key.as_str()), upper)?;
    let expected = 1 + cmp::max(left, right);
    if node.height != expected {
        return Err(format!(
            "Node '{}' caches height {} but has height {}",
            node.key, node.height, expected
        ));
    }
    if left.abs_diff(right) > 1 {
        return Err(format!(
            "Node '{}' is unbalanced: left height {}, right height {}",
            node.key, left, right
        ));
    }
    Ok(expected)
}

/// Serialized form of a role directory node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSnapshot {
    pub key: String,
    pub value: String,
    pub left: Option<Box<RoleSnapshot>>,
    pub right: Option<Box<RoleSnapshot>>,
}

fn dump(link: &Link) -> Option<Box<RoleSnapshot>> {
    link.as_ref().map(|node| {
        Box::new(RoleSnapshot {
            key: node.key.clone(),
            value: node.value.clone(),
            left: dump(&node.left),
            right: dump(&node.right),
        })
    })
}

fn restore(snapshot: &Option<Box<RoleSnapshot>>, count: &mut usize) -> Link {
    snapshot.as_ref().map(|snap| {
        *count += 1;
        let mut node = Box::new(RoleNode::new(snap.key.clone(), snap.value.clone()));
        node.left = restore(&snap.left, count);
        node.right = restore(&snap.right, count);
        node.update_height();
        node
    })
}

/// Height-balanced directory of role assignments keyed by user identity.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    root: Link,
    len: usize,
}

impl RoleDirectory {
    pub fn new() -> Self {
        RoleDirectory { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<&RoleNode> {
        self.root.as_deref()
    }

    /// Height of the tree; 0 when empty.
    pub fn height(&self) -> usize {
        height(&self.root)
    }

    /// Assign `value` to `key`. An existing assignment is overwritten in place
    /// and its previous value returned.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        debug!(identity = key, "assigning role");
        let mut replaced = None;
        self.root = Some(insert(self.root.take(), key, value.into(), &mut replaced));
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Remove an assignment, returning its value. Absent keys leave the tree
    /// unchanged.
    pub fn delete(&mut self, key: &str) -> Option<String> {
        let mut removed = None;
        self.root = delete(self.root.take(), key, &mut removed);
        if removed.is_some() {
            self.len -= 1;
            debug!(identity = key, "removed role assignment");
        }
        removed
    }

    pub fn search(&self, key: &str) -> Option<&str> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match key.cmp(node.key.as_str()) {
                Ordering::Equal => return Some(&node.value),
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
            };
        }
        None
    }

    /// Every `(key, value)` pair, children before their parent, left first.
    pub fn traverse_postorder(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::with_capacity(self.len);
        postorder(&self.root, &mut out);
        out
    }

    /// Check BST ordering, cached heights and the AVL balance bound.
    pub fn validate(&self) -> Result<(), String> {
        validate(&self.root, None, None)?;
        let count = self.traverse_postorder().len();
        if count != self.len {
            return Err(format!("Tree holds {} nodes but len is {}", count, self.len));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Option<Box<RoleSnapshot>> {
        dump(&self.root)
    }

    /// Rebuild a directory from a snapshot. Heights are recomputed; the result
    /// is checked with [`RoleDirectory::validate`].
    pub fn from_snapshot(snapshot: &Option<Box<RoleSnapshot>>) -> IndexResult<Self> {
        let mut len = 0;
        let root = restore(snapshot, &mut len);
        let directory = RoleDirectory { root, len };
        directory.validate().map_err(IndexError::InvalidSnapshot)?;
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(directory: &RoleDirectory) -> Vec<&str> {
        directory.traverse_postorder().into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_empty() {
        let directory = RoleDirectory::new();
        assert!(directory.is_empty());
        assert_eq!(directory.search("a"), None);
        assert_eq!(directory.height(), 0);
        assert!(directory.traverse_postorder().is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let mut directory = RoleDirectory::new();
        assert_eq!(directory.insert("alice@example.com", "admin"), None);
        assert_eq!(directory.insert("bob@example.com", "developer"), None);
        assert_eq!(directory.search("alice@example.com"), Some("admin"));
        assert_eq!(directory.search("bob@example.com"), Some("developer"));
        assert_eq!(directory.search("carol@example.com"), None);
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut directory = RoleDirectory::new();
        for key in ["b", "a", "c"] {
            directory.insert(key, "guest");
        }
        let before = keys(&directory).into_iter().map(String::from).collect::<Vec<_>>();
        assert_eq!(directory.insert("a", "admin"), Some("guest".to_string()));
        assert_eq!(directory.search("a"), Some("admin"));
        assert_eq!(keys(&directory), before);
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn test_left_left_rotation() {
        let mut directory = RoleDirectory::new();
        for key in ["c", "b", "a"] {
            directory.insert(key, "r");
        }
        assert_eq!(directory.root().unwrap().key, "b");
        assert_eq!(keys(&directory), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_right_right_rotation() {
        let mut directory = RoleDirectory::new();
        for key in ["a", "b", "c"] {
            directory.insert(key, "r");
        }
        assert_eq!(directory.root().unwrap().key, "b");
        assert_eq!(directory.height(), 2);
    }

    #[test]
    fn test_left_right_rotation() {
        let mut directory = RoleDirectory::new();
        for key in ["c", "a", "b"] {
            directory.insert(key, "r");
        }
        let root = directory.root().unwrap();
        assert_eq!(root.key, "b");
        assert_eq!(root.left().unwrap().key, "a");
        assert_eq!(root.right().unwrap().key, "c");
    }

    #[test]
    fn test_right_left_rotation() {
        let mut directory = RoleDirectory::new();
        for key in ["a", "c", "b"] {
            directory.insert(key, "r");
        }
        let root = directory.root().unwrap();
        assert_eq!(root.key, "b");
        assert_eq!(root.left().unwrap().key, "a");
        assert_eq!(root.right().unwrap().key, "c");
    }

    #[test]
    fn test_sorted_inserts_stay_logarithmic() {
        let mut directory = RoleDirectory::new();
        for i in 1..=1000 {
            directory.insert(&format!("user{:04}", i), "guest");
        }
        assert_eq!(directory.len(), 1000);
        assert!(directory.height() <= 15, "height {}", directory.height());
        assert!(directory.validate().is_ok());
    }

    #[test]
    fn test_delete_cases() {
        let mut directory = RoleDirectory::new();
        for key in ["d", "b", "f", "a", "c", "e", "g"] {
            directory.insert(key, key.to_uppercase());
        }

        // leaf
        assert_eq!(directory.delete("a"), Some("A".to_string()));
        // two children at the root: the successor takes its place
        assert_eq!(directory.delete("d"), Some("D".to_string()));
        assert_eq!(directory.root().unwrap().key, "e");
        assert!(directory.validate().is_ok());
        // one child
        assert_eq!(directory.delete("b"), Some("B".to_string()));
        assert!(directory.validate().is_ok());
        assert_eq!(keys(&directory), vec!["c", "g", "f", "e"]);
        assert_eq!(directory.search("c"), Some("C"));
    }

    #[test]
    fn test_delete_rebalances() {
        let mut directory = RoleDirectory::new();
        for i in 0..200 {
            directory.insert(&format!("k{:03}", i), i.to_string());
        }
        for i in (0..200).filter(|i| i % 3 != 0) {
            assert!(directory.delete(&format!("k{:03}", i)).is_some());
            assert!(directory.validate().is_ok());
        }
        assert_eq!(directory.len(), 67);
        assert_eq!(directory.search("k003"), Some("3"));
        assert_eq!(directory.search("k004"), None);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut directory = RoleDirectory::new();
        for key in ["m", "c", "x"] {
            directory.insert(key, "r");
        }
        let before: Vec<(String, String)> = directory
            .traverse_postorder()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(directory.delete("q"), None);
        let after: Vec<(String, String)> = directory
            .traverse_postorder()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(before, after);
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn test_rotation_keeps_heights() {
        let mut node = Box::new(RoleNode::new("b".into(), "r".into()));
        node.left = Some(Box::new(RoleNode::new("a".into(), "r".into())));
        node.update_height();
        let rotated = rotate_right(node);
        assert_eq!(rotated.key, "a");
        assert_eq!(rotated.height(), 2);
        assert_eq!(rotated.right().unwrap().height(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut directory = RoleDirectory::new();
        for i in 0..50 {
            directory.insert(&format!("user{}", i), "developer");
        }
        let snapshot = directory.snapshot();
        let rebuilt = RoleDirectory::from_snapshot(&snapshot).unwrap();
        assert_eq!(rebuilt.len(), 50);
        assert_eq!(rebuilt.height(), directory.height());
        assert_eq!(rebuilt.snapshot(), snapshot);
    }

    #[test]
    fn test_snapshot_rejects_unbalanced() {
        let chain = Some(Box::new(RoleSnapshot {
            key: "a".into(),
            value: "r".into(),
            left: None,
            right: Some(Box::new(RoleSnapshot {
                key: "b".into(),
                value: "r".into(),
                left: None,
                right: Some(Box::new(RoleSnapshot {
                    key: "c".into(),
                    value: "r".into(),
                    left: None,
                    right: None,
                })),
            })),
        }));
        assert!(RoleDirectory::from_snapshot(&chain).is_err());
    }
}
