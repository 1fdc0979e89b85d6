//! Content block index: a B-tree of minimum degree `t`.
//!
//! Every node except the root holds between `t - 1` and `2t - 1` keys, the
//! root at most `2t - 1`. Internal nodes have one more child than keys and all
//! leaves sit at the same depth.
//!
//! Insertion splits full nodes on the way down, so a parent always has room for
//! the median of a child that splits. Deletion works the other way round: before
//! descending into a child that only has `t - 1` keys, the child is topped up by
//! borrowing from a sibling or by merging with one.
//!
//! ## Example
//!
//! ```text
//! t = 3, after inserting a1..a6:
//!
//!          [a3]
//!         /    \
//!   [a1 a2]    [a4 a5 a6]
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::mem;
use tracing::{debug, trace};

use crate::config::{MAX_BLOCK_DEGREE, MIN_BLOCK_DEGREE};
use crate::content::{BlockEntry, ContentHash};
use crate::error::{IndexError, IndexResult};
use crate::stats::BlockIndexStats;

/// Default minimum degree.
pub const DEFAULT_MIN_DEGREE: usize = 3;

/// The block index as used by a repository: content hash to staged entry.
pub type ContentIndex = BlockIndex<ContentHash, BlockEntry>;

/// B-tree node.
///
/// `keys` and `values` are parallel. For internal nodes `children[i]` holds
/// keys below `keys[i]` and `children[i + 1]` keys above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNode<K, V> {
    pub keys: Vec<K>,
    pub values: Vec<V>,
    pub children: Vec<BlockNode<K, V>>,
    pub leaf: bool,
}

impl<K, V> BlockNode<K, V> {
    /// Create an empty leaf.
    pub fn new_leaf() -> Self {
        BlockNode {
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            leaf: true,
        }
    }

    /// Create an empty internal node.
    pub fn new_internal() -> Self {
        BlockNode {
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
            leaf: false,
        }
    }

    fn rightmost_key(&self) -> Option<&K> {
        let mut node = self;
        while !node.leaf {
            node = node.children.last()?;
        }
        node.keys.last()
    }

    fn leftmost_key(&self) -> Option<&K> {
        let mut node = self;
        while !node.leaf {
            node = node.children.first()?;
        }
        node.keys.first()
    }
}

impl<K: Ord + Clone, V> BlockNode<K, V> {
    fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self;
        loop {
            let i = node.keys.partition_point(|k| k.borrow() < key);
            if i < node.keys.len() && node.keys[i].borrow() == key {
                return Some(&node.values[i]);
            }
            if node.leaf {
                return None;
            }
            node = node.children.get(i)?;
        }
    }

    fn search_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let i = self.keys.partition_point(|k| k.borrow() < key);
        if i < self.keys.len() && self.keys[i].borrow() == key {
            return Some(&mut self.values[i]);
        }
        if self.leaf {
            return None;
        }
        self.children.get_mut(i)?.search_mut(key)
    }

    /// Split the full child at `index`. Its median moves up into `self` at
    /// `index` and its upper half becomes a new sibling at `index + 1`.
    fn split_child(&mut self, index: usize, t: usize) {
        let child = &mut self.children[index];
        debug_assert_eq!(child.keys.len(), 2 * t - 1, "split of a non-full child");

        let sibling = BlockNode {
            keys: child.keys.split_off(t),
            values: child.values.split_off(t),
            children: if child.leaf {
                Vec::new()
            } else {
                child.children.split_off(t)
            },
            leaf: child.leaf,
        };
        let median_key = child.keys.remove(t - 1);
        let median_value = child.values.remove(t - 1);

        self.keys.insert(index, median_key);
        self.values.insert(index, median_value);
        self.children.insert(index + 1, sibling);
        trace!(index, keys = self.keys.len(), "split child");
    }

    /// Insert into a node known to have room.
    fn insert_non_full(&mut self, key: K, value: V, t: usize) {
        let mut i = self.keys.partition_point(|k| k < &key);
        if self.leaf {
            self.keys.insert(i, key);
            self.values.insert(i, value);
            return;
        }

        if self.children[i].keys.len() == 2 * t - 1 {
            self.split_child(i, t);
            if key > self.keys[i] {
                i += 1;
            }
        }
        self.children[i].insert_non_full(key, value, t);
    }

    /// Remove `key` from this subtree, returning the stored pair.
    ///
    /// The caller guarantees that `self` has at least `t` keys unless it is the
    /// root.
    fn remove<Q>(&mut self, key: &Q, t: usize) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let i = self.keys.partition_point(|k| k.borrow() < key);

        if i < self.keys.len() && self.keys[i].borrow() == key {
            if self.leaf {
                return Some((self.keys.remove(i), self.values.remove(i)));
            }
            return self.remove_from_internal(i, key, t);
        }

        if self.leaf {
            return None;
        }

        let was_last = i == self.keys.len();
        if self.children[i].keys.len() < t {
            self.fill(i, t);
        }

        // Filling the last child may have merged it into its left sibling.
        if was_last && i > self.keys.len() {
            self.children[i - 1].remove(key, t)
        } else {
            self.children[i].remove(key, t)
        }
    }

    /// Remove the key at `idx` of an internal node.
    fn remove_from_internal<Q>(&mut self, idx: usize, key: &Q, t: usize) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if self.children[idx].keys.len() >= t {
            let predecessor = self.children[idx].rightmost_key()?.clone();
            let (k, v) = self.children[idx].remove::<K>(&predecessor, t)?;
            return Some(self.replace_entry(idx, k, v));
        }

        if self.children[idx + 1].keys.len() >= t {
            let successor = self.children[idx + 1].leftmost_key()?.clone();
            let (k, v) = self.children[idx + 1].remove::<K>(&successor, t)?;
            return Some(self.replace_entry(idx, k, v));
        }

        self.merge(idx, t);
        self.children[idx].remove(key, t)
    }

    fn replace_entry(&mut self, idx: usize, key: K, value: V) -> (K, V) {
        (
            mem::replace(&mut self.keys[idx], key),
            mem::replace(&mut self.values[idx], value),
        )
    }

    /// Top up the child at `idx`, which holds fewer than `t` keys.
    fn fill(&mut self, idx: usize, t: usize) {
        let last = self.children.len() - 1;
        if idx != 0 && self.children[idx - 1].keys.len() >= t {
            self.borrow_from_prev(idx);
        } else if idx != last && self.children[idx + 1].keys.len() >= t {
            self.borrow_from_next(idx);
        } else if idx != last {
            self.merge(idx, t);
        } else {
            self.merge(idx - 1, t);
        }
    }

    /// Rotate the separator at `idx - 1` down into child `idx` and the left
    /// sibling's last key up into its place.
    fn borrow_from_prev(&mut self, idx: usize) {
        let (left, right) = self.children.split_at_mut(idx);
        let sibling = &mut left[idx - 1];
        let child = &mut right[0];

        let (Some(sibling_key), Some(sibling_value)) = (sibling.keys.pop(), sibling.values.pop()) else {
            return;
        };
        let parent_key = mem::replace(&mut self.keys[idx - 1], sibling_key);
        let parent_value = mem::replace(&mut self.values[idx - 1], sibling_value);
        child.keys.insert(0, parent_key);
        child.values.insert(0, parent_value);

        if !child.leaf {
            if let Some(grandchild) = sibling.children.pop() {
                child.children.insert(0, grandchild);
            }
        }
        trace!(idx, "borrowed from left sibling");
    }

    /// Rotate the separator at `idx` down into child `idx` and the right
    /// sibling's first key up into its place.
    fn borrow_from_next(&mut self, idx: usize) {
        let (left, right) = self.children.split_at_mut(idx + 1);
        let child = &mut left[idx];
        let sibling = &mut right[0];

        let sibling_key = sibling.keys.remove(0);
        let sibling_value = sibling.values.remove(0);
        let parent_key = mem::replace(&mut self.keys[idx], sibling_key);
        let parent_value = mem::replace(&mut self.values[idx], sibling_value);
        child.keys.push(parent_key);
        child.values.push(parent_value);

        if !child.leaf {
            child.children.push(sibling.children.remove(0));
        }
        trace!(idx, "borrowed from right sibling");
    }

    /// Merge child `idx + 1` and the separator at `idx` into child `idx`.
    fn merge(&mut self, idx: usize, t: usize) {
        let sibling = self.children.remove(idx + 1);
        let key = self.keys.remove(idx);
        let value = self.values.remove(idx);

        let child = &mut self.children[idx];
        child.keys.push(key);
        child.values.push(value);
        child.keys.extend(sibling.keys);
        child.values.extend(sibling.values);
        child.children.extend(sibling.children);
        debug_assert!(child.keys.len() <= 2 * t - 1, "merge overflowed a node");
        trace!(idx, keys = child.keys.len(), "merged children");
    }

    fn preorder<'a>(&'a self, depth: usize, out: &mut Vec<(&'a K, &'a V, usize)>) {
        for (i, (key, value)) in self.keys.iter().zip(&self.values).enumerate() {
            out.push((key, value, depth));
            if !self.leaf {
                if let Some(child) = self.children.get(i) {
                    child.preorder(depth + 1, out);
                }
            }
        }
        if !self.leaf && self.children.len() > self.keys.len() {
            if let Some(last) = self.children.last() {
                last.preorder(depth + 1, out);
            }
        }
    }

    fn collect_stats(&self, stats: &mut BlockIndexStats) {
        if self.leaf {
            stats.record_leaf(self.keys.len());
        } else {
            stats.record_internal(self.keys.len());
            for child in &self.children {
                child.collect_stats(stats);
            }
        }
    }

    /// Validate this node and its subtree.
    ///
    /// # Arguments
    ///
    /// * `t` - Minimum degree
    /// * `is_root` - Whether the lower key-count bound is waived
    /// * `lower`, `upper` - Exclusive key bounds inherited from ancestors
    /// * `depth` - Depth of this node
    /// * `leaf_depth` - Depth of the first leaf seen, shared across the walk
    ///
    /// # Returns
    ///
    /// Number of keys in the subtree
    fn validate(
        &self,
        t: usize,
        is_root: bool,
        lower: Option<&K>,
        upper: Option<&K>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> Result<usize, String> {
        if self.keys.len() != self.values.len() {
            return Err(format!(
                "Node at depth {} has {} keys but {} values",
                depth,
                self.keys.len(),
                self.values.len()
            ));
        }
        if self.keys.len() > 2 * t - 1 {
            return Err(format!(
                "Node at depth {} has {} keys, more than {}",
                depth,
                self.keys.len(),
                2 * t - 1
            ));
        }
        if !is_root && self.keys.len() < t - 1 {
            return Err(format!(
                "Node at depth {} has {} keys, fewer than {}",
                depth,
                self.keys.len(),
                t - 1
            ));
        }
        if self.keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(format!("Keys out of order in node at depth {}", depth));
        }
        if let (Some(lower), Some(first)) = (lower, self.keys.first()) {
            if first <= lower {
                return Err(format!("Key below separator at depth {}", depth));
            }
        }
        if let (Some(upper), Some(last)) = (upper, self.keys.last()) {
            if last >= upper {
                return Err(format!("Key above separator at depth {}", depth));
            }
        }

        if self.leaf {
            if !self.children.is_empty() {
                return Err(format!("Leaf at depth {} has children", depth));
            }
            match *leaf_depth {
                Some(expected) if expected != depth => {
                    return Err(format!(
                        "Leaf at depth {} but other leaves at depth {}",
                        depth, expected
                    ));
                }
                Some(_) => {}
                None => *leaf_depth = Some(depth),
            }
            return Ok(self.keys.len());
        }

        if self.children.len() != self.keys.len() + 1 {
            return Err(format!(
                "Internal node at depth {} has {} keys but {} children (should be keys+1)",
                depth,
                self.keys.len(),
                self.children.len()
            ));
        }

        let mut count = self.keys.len();
        for (i, child) in self.children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { self.keys.get(i - 1) };
            let child_upper = self.keys.get(i).or(upper);
            count += child.validate(t, false, child_lower, child_upper, depth + 1, leaf_depth)?;
        }
        Ok(count)
    }
}

/// Serialized form of a block index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSnapshot<K, V> {
    pub min_degree: usize,
    pub root: BlockNode<K, V>,
}

/// B-tree keyed by `K`.
#[derive(Debug, Clone)]
pub struct BlockIndex<K, V> {
    root: BlockNode<K, V>,
    t: usize,
    len: usize,
}

impl<K: Ord + Clone, V> BlockIndex<K, V> {
    /// Create an empty index with minimum degree `min_degree`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `min_degree` is outside
    /// `MIN_BLOCK_DEGREE..=MAX_BLOCK_DEGREE`.
    pub fn new(min_degree: usize) -> IndexResult<Self> {
        if !(MIN_BLOCK_DEGREE..=MAX_BLOCK_DEGREE).contains(&min_degree) {
            return Err(IndexError::InvalidConfig(format!(
                "B-tree minimum degree must be between {} and {}, got {}",
                MIN_BLOCK_DEGREE, MAX_BLOCK_DEGREE, min_degree
            )));
        }
        Ok(BlockIndex {
            root: BlockNode::new_leaf(),
            t: min_degree,
            len: 0,
        })
    }

    pub fn min_degree(&self) -> usize {
        self.t
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn root(&self) -> &BlockNode<K, V> {
        &self.root
    }

    /// Number of levels; 1 for a lone leaf root.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = &self.root;
        while let Some(child) = node.children.first() {
            node = child;
            height += 1;
        }
        height
    }

    pub fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.root.search(key)
    }

    /// Insert a key. An existing key has its value replaced and the old value
    /// returned; the tree shape is unchanged in that case.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if let Some(existing) = self.root.search_mut(&key) {
            return Some(mem::replace(existing, value));
        }

        let t = self.t;
        if self.root.keys.len() == 2 * t - 1 {
            let old_root = mem::replace(&mut self.root, BlockNode::new_internal());
            self.root.children.push(old_root);
            self.root.split_child(0, t);
            debug!(height = self.height(), "block index root split");
        }
        self.root.insert_non_full(key, value, t);
        self.len += 1;
        None
    }

    /// Delete a key, returning its value. Absent keys are a no-op.
    pub fn delete<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        // Top-down fixups reshape the path even when the key is missing.
        self.root.search(key)?;
        let removed = self.root.remove(key, self.t);

        if self.root.keys.is_empty() && !self.root.leaf && !self.root.children.is_empty() {
            let new_root = self.root.children.remove(0);
            self.root = new_root;
            debug!(height = self.height(), "block index root collapsed");
        }

        let (_, value) = removed?;
        self.len -= 1;
        Some(value)
    }

    /// Every entry with its depth, each key emitted before the child to its
    /// left, and the last child after the last key.
    pub fn traverse_preorder(&self) -> Vec<(&K, &V, usize)> {
        let mut out = Vec::with_capacity(self.len);
        self.root.preorder(0, &mut out);
        out
    }

    /// Node fill statistics.
    pub fn stats(&self) -> BlockIndexStats {
        let mut stats = BlockIndexStats::new();
        stats.height = self.height();
        self.root.collect_stats(&mut stats);
        stats
    }

    /// Check every B-tree invariant and the cached length.
    pub fn validate(&self) -> Result<(), String> {
        let mut leaf_depth = None;
        let count = self.root.validate(self.t, true, None, None, 0, &mut leaf_depth)?;
        if count != self.len {
            return Err(format!("Tree holds {} keys but len is {}", count, self.len));
        }
        Ok(())
    }
}

impl<K: Ord + Clone, V: Clone> BlockIndex<K, V> {
    pub fn snapshot(&self) -> BlockSnapshot<K, V> {
        BlockSnapshot {
            min_degree: self.t,
            root: self.root.clone(),
        }
    }

    /// Rebuild an index from a snapshot, rejecting malformed trees.
    pub fn from_snapshot(snapshot: BlockSnapshot<K, V>) -> IndexResult<Self> {
        let mut index = Self::new(snapshot.min_degree)
            .map_err(|err| IndexError::InvalidSnapshot(err.to_string()))?;
        let mut leaf_depth = None;
        let count = snapshot
            .root
            .validate(snapshot.min_degree, true, None, None, 0, &mut leaf_depth)
            .map_err(IndexError::InvalidSnapshot)?;
        index.root = snapshot.root;
        index.len = count;
        Ok(index)
    }
}

impl<K: Ord + Clone, V> Default for BlockIndex<K, V> {
    fn default() -> Self {
        BlockIndex {
            root: BlockNode::new_leaf(),
            t: DEFAULT_MIN_DEGREE,
            len: 0,
        }
    }
}
