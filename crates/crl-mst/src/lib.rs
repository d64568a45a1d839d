//! # crl-mst
//!
//! Merkle search tree index for the Causeway replicated log.
//!
//! The tree is a sync-efficiency structure, not a source of truth: its leaves
//! are the message ids held by the log store, and its root hash is a
//! commitment to that whole set. Two replicas compare roots to decide in one
//! round trip whether they diverge, then walk mismatching nodes level by
//! level to find the divergent keys.
//!
//! The construction rule (how keys group into nodes) is a protocol contract
//! between peers; see [`tree`] for the rule and [`TREE_PROTOCOL_VERSION`].

mod error;
mod node;
mod tree;

pub use error::TreeError;
pub use node::Node;
pub use tree::{MerkleSearchTree, NodeKey, DEFAULT_FANOUT, TREE_PROTOCOL_VERSION};
