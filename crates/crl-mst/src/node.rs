//! Tree node shape shared with the sync wire protocol.

use crl_core::{Hash, MessageId};
use serde::{Deserialize, Serialize};

/// One node of the Merkle search tree.
///
/// `key == None` marks the leftmost (anchor) node of a level; every level has
/// exactly one. A node's hash commits to the hashes of all nodes below it, so
/// comparing two nodes at the same `(level, key)` position decides whether
/// the subtrees beneath them hold the same message ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub level: u32,
    pub key: Option<MessageId>,
    pub hash: Hash,
}

impl Node {
    pub fn is_anchor(&self) -> bool {
        self.key.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }
}
