//! The Merkle search tree proper.
//!
//! A deterministic, content-addressed tree over the set of stored message
//! ids. The shape is a pure function of the key set: each node's placement is
//! decided by its own hash, so two replicas holding the same ids build
//! byte-identical trees no matter what order the ids arrived in. That is the
//! property the sync protocol leans on — equal roots mean "nothing to do" in
//! one round trip.
//!
//! ## Boundary rule (protocol version 1)
//!
//! Leaves hash as `sha256(0x00 || key)`; the anchor leaf is `sha256(0x00)`.
//! Internal nodes hash as `sha256(0x01 || child hashes, left to right)`.
//! A node is a *boundary* when the big-endian `u32` formed by the first four
//! bytes of its hash is strictly below `u32::MAX / fanout` (default fanout
//! 16). Level `L+1` groups level-`L` nodes into runs starting at the anchor
//! and at every boundary node; a run's parent takes the run's first key.
//! Levels stack until one holds a single node — the root.
//!
//! Both peers of a topic must agree on this rule, so it is pinned by
//! [`TREE_PROTOCOL_VERSION`] and checked during the sync root handshake.

use crate::error::TreeError;
use crate::node::Node;
use crl_core::{Hash, Hasher, MessageId};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Version of the tree construction rule. Exchanged at sync handshake; peers
/// with different versions cannot diff each other's trees.
pub const TREE_PROTOCOL_VERSION: u32 = 1;

/// Default expected branching factor.
pub const DEFAULT_FANOUT: u32 = 16;

/// Key of a node within a level; `None` is the anchor and sorts first.
pub type NodeKey = Option<MessageId>;

/// Merkle search tree over a set of message ids.
///
/// Not the source of truth — the log store is. The tree is fully rebuildable
/// from the stored key set via [`MerkleSearchTree::from_keys`].
#[derive(Clone, Debug)]
pub struct MerkleSearchTree {
    /// `levels[0]` holds the anchor leaf plus one leaf per key; each higher
    /// level holds the parent runs of the one below. The topmost level always
    /// contains exactly one node: the root.
    levels: Vec<BTreeMap<NodeKey, Hash>>,
    boundary_limit: u32,
}

impl MerkleSearchTree {
    pub fn new() -> Self {
        Self::with_fanout(DEFAULT_FANOUT)
    }

    /// A tree with a non-default fanout. Both peers of a topic must use the
    /// same value; it is part of the tree protocol, not a local tuning knob.
    pub fn with_fanout(fanout: u32) -> Self {
        let mut level0 = BTreeMap::new();
        level0.insert(None, anchor_hash());
        MerkleSearchTree {
            levels: vec![level0],
            boundary_limit: u32::MAX / fanout.max(2),
        }
    }

    /// Rebuild a tree from scratch over a key set (recovery path).
    pub fn from_keys<I: IntoIterator<Item = MessageId>>(keys: I) -> Self {
        let mut tree = Self::new();
        for key in keys {
            tree.insert(key);
        }
        tree
    }

    /// Number of keys (not nodes) in the tree.
    pub fn len(&self) -> usize {
        self.levels[0].len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &MessageId) -> bool {
        self.levels[0].contains_key(&Some(*key))
    }

    /// Iterate the stored keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &MessageId> {
        self.levels[0].keys().filter_map(|k| k.as_ref())
    }

    /// The stored keys within a range, in ascending order.
    pub fn keys_in_range<R>(&self, range: R) -> Vec<MessageId>
    where
        R: std::ops::RangeBounds<MessageId>,
    {
        let lo = match range.start_bound() {
            Bound::Included(k) => Bound::Included(Some(*k)),
            Bound::Excluded(k) => Bound::Excluded(Some(*k)),
            // Skip the anchor, which is not a key.
            Bound::Unbounded => Bound::Excluded(None),
        };
        let hi = match range.end_bound() {
            Bound::Included(k) => Bound::Included(Some(*k)),
            Bound::Excluded(k) => Bound::Excluded(Some(*k)),
            Bound::Unbounded => Bound::Unbounded,
        };
        self.levels[0]
            .range((lo, hi))
            .filter_map(|(k, _)| *k)
            .collect()
    }

    /// Insert a key. Returns false if it was already present.
    ///
    /// Only the run of nodes between the enclosing boundaries is recomputed
    /// at each level, so an insert touches an amortized-logarithmic slice of
    /// the tree rather than rebuilding it.
    pub fn insert(&mut self, key: MessageId) -> bool {
        let node_key = Some(key);
        if self.levels[0].contains_key(&node_key) {
            return false;
        }
        self.levels[0].insert(node_key, leaf_hash(&key));
        self.rebuild_upward(node_key, node_key);
        true
    }

    /// Remove a key. Returns false if it was not present.
    pub fn remove(&mut self, key: &MessageId) -> bool {
        let node_key = Some(*key);
        if self.levels[0].remove(&node_key).is_none() {
            return false;
        }
        self.rebuild_upward(node_key, node_key);
        true
    }

    /// The root node. For an empty tree this is the level-0 anchor.
    pub fn root(&self) -> Node {
        let top = self.levels.len() - 1;
        let (key, hash) = self.levels[top]
            .iter()
            .next()
            .map(|(k, h)| (*k, *h))
            .unwrap_or((None, anchor_hash()));
        Node {
            level: top as u32,
            key,
            hash,
        }
    }

    /// Hash of the node at `(level, key)`, if one exists.
    pub fn node_hash(&self, level: u32, key: NodeKey) -> Option<Hash> {
        self.levels
            .get(level as usize)
            .and_then(|nodes| nodes.get(&key))
            .copied()
    }

    /// The ordered children of an internal node.
    ///
    /// Children of `(L, k)` are the level-`L-1` nodes from `k` (inclusive) up
    /// to the next level-`L` key (exclusive).
    pub fn children(&self, level: u32, key: NodeKey) -> Result<Vec<Node>, TreeError> {
        if level == 0 {
            return Err(TreeError::LeafHasNoChildren(key));
        }
        let lvl = level as usize;
        if lvl >= self.levels.len() || !self.levels[lvl].contains_key(&key) {
            return Err(TreeError::UnknownNode { level, key });
        }

        let next = self.levels[lvl]
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| *k);
        let upper = next.map_or(Bound::Unbounded, Bound::Excluded);

        Ok(self.levels[lvl - 1]
            .range((Bound::Included(key), upper))
            .map(|(k, h)| Node {
                level: level - 1,
                key: *k,
                hash: *h,
            })
            .collect())
    }

    fn is_boundary(limit: u32, hash: &Hash) -> bool {
        let bytes = hash.as_bytes();
        let prefix = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        prefix < limit
    }

    /// Recompute parent runs from level 0 upward after the leaves in
    /// `[lo, hi]` changed.
    fn rebuild_upward(&mut self, mut lo: NodeKey, mut hi: NodeKey) {
        let mut level = 0usize;
        loop {
            if self.levels[level].len() <= 1 {
                // This level is a lone anchor: it is the root. Anything above
                // is stale structure from before a removal.
                self.levels.truncate(level + 1);
                break;
            }
            if level + 1 == self.levels.len() {
                // First time this level overflows into a parent level: build
                // every run, not just the changed window.
                self.levels.push(BTreeMap::new());
                lo = None;
                hi = self.levels[level].keys().next_back().copied().unwrap_or(None);
            }
            if !self.rebuild_window(level, &mut lo, &mut hi) {
                break;
            }
            level += 1;
        }
    }

    /// Recompute the parent runs covering children `[lo, hi]` at `level`.
    ///
    /// The window extends left to the nearest run-starting node strictly
    /// below `lo` and right to the nearest boundary strictly above `hi`;
    /// nodes outside it kept their hashes, so their runs are unaffected.
    /// Returns false when the recomputed runs equal the stored ones, which
    /// stops the upward propagation.
    fn rebuild_window(&mut self, level: usize, lo: &mut NodeKey, hi: &mut NodeKey) -> bool {
        let limit = self.boundary_limit;

        let (start, end, runs) = {
            let children = &self.levels[level];

            let start = children
                .range(..*lo)
                .rev()
                .find(|(k, h)| k.is_none() || Self::is_boundary(limit, h))
                .map(|(k, _)| *k)
                .unwrap_or(None);

            let end = children
                .range((Bound::Excluded(*hi), Bound::Unbounded))
                .find(|(_, h)| Self::is_boundary(limit, h))
                .map(|(k, _)| *k);

            let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
            let mut runs: Vec<(NodeKey, Hash)> = Vec::new();
            let mut current: Option<(NodeKey, Hasher)> = None;
            for (key, hash) in children.range((Bound::Included(start), upper)) {
                let starts_run =
                    current.is_none() || key.is_none() || Self::is_boundary(limit, hash);
                if starts_run {
                    if let Some((run_key, hasher)) = current.take() {
                        runs.push((run_key, hasher.finalize()));
                    }
                    let mut hasher = Hasher::new();
                    hasher.update(&[0x01]);
                    current = Some((*key, hasher));
                }
                if let Some((_, hasher)) = current.as_mut() {
                    hasher.update(hash.as_bytes());
                }
            }
            if let Some((run_key, hasher)) = current.take() {
                runs.push((run_key, hasher.finalize()));
            }
            (start, end, runs)
        };

        let parent_level = level + 1;
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
        let old: Vec<(NodeKey, Hash)> = self.levels[parent_level]
            .range((Bound::Included(start), upper))
            .map(|(k, h)| (*k, *h))
            .collect();

        if old == runs {
            return false;
        }

        for (key, _) in &old {
            self.levels[parent_level].remove(key);
        }
        let mut max_changed = start;
        for (key, _) in old.iter().chain(runs.iter()) {
            max_changed = max_changed.max(*key);
        }
        for (key, hash) in runs {
            self.levels[parent_level].insert(key, hash);
        }

        *lo = start;
        *hi = max_changed;
        true
    }
}

impl Default for MerkleSearchTree {
    fn default() -> Self {
        Self::new()
    }
}

fn anchor_hash() -> Hash {
    Hash::digest(&[0x00])
}

fn leaf_hash(key: &MessageId) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(&[0x00]);
    hasher.update(key.as_bytes());
    hasher.finalize()
}
