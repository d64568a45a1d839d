//! Sync wire protocol shapes.
//!
//! Three request types walk a remote tree and pull message bytes. Byte
//! framing on the wire is the transport collaborator's concern; these types
//! only fix the node/key/hash and payload shapes that must survive it.

use crl_core::MessageId;
use crl_mst::{Node, NodeKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a peer, assigned by the transport layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request within a sync session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRequest {
    /// Root node plus the tree protocol version it was built under.
    GetRoot,

    /// Ordered children of the node at `(level, key)`.
    GetChildren { level: u32, key: NodeKey },

    /// Canonical signed-envelope bytes for a batch of ids.
    GetValues { keys: Vec<MessageId> },
}

/// A response within a sync session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResponse {
    Root { version: u32, node: Node },

    Children { nodes: Vec<Node> },

    /// Envelope bytes for the requested ids; unknown ids are silently
    /// omitted, so the response may be shorter than the request.
    Values { messages: Vec<Vec<u8>> },

    /// The serving side could not answer (e.g. the node vanished between
    /// walk steps). The requesting side aborts the session.
    Error { reason: String },
}
