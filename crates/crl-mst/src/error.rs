//! Tree lookup errors.

use crate::tree::NodeKey;

/// Errors from tree node lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// No node exists at the requested `(level, key)` position.
    UnknownNode { level: u32, key: NodeKey },

    /// Children were requested for a level-0 node.
    LeafHasNoChildren(NodeKey),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeError::UnknownNode { level, key } => {
                write!(f, "no node at level {} key {}", level, key_label(key))
            }
            TreeError::LeafHasNoChildren(key) => {
                write!(f, "leaf {} has no children", key_label(key))
            }
        }
    }
}

impl std::error::Error for TreeError {}

fn key_label(key: &NodeKey) -> String {
    match key {
        Some(id) => id.short(),
        None => "(anchor)".to_string(),
    }
}
