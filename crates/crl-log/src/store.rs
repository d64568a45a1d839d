//! Storage seam for the log's persisted tables.
//!
//! The persisted layout is four tables: signed message bytes by id, parent
//! index by id, the per-topic head set, and the tree nodes (held by the tree
//! itself). Everything except the message table is derivable from it, which
//! is the recovery story: [`MemoryLogStore::rebuild_indexes`] reconstructs
//! heads and the children index from the messages alone.

use crl_core::{MessageId, Payload, SignedMessage};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Storage contract for one topic's log.
///
/// `commit` must be atomic: the message row, its parent-index rows and the
/// head-set update land together or not at all. The in-memory implementation
/// gets this for free; a durable backend would wrap them in one transaction.
pub trait LogStore<P: Payload>: Send + Sync {
    fn get(&self, id: &MessageId) -> Option<&SignedMessage<P>>;

    /// Canonical envelope bytes as stored at acceptance; what sync pulls
    /// serve.
    fn get_bytes(&self, id: &MessageId) -> Option<&[u8]>;

    fn contains(&self, id: &MessageId) -> bool;

    fn clock(&self, id: &MessageId) -> Option<u64>;

    /// Commit an accepted message. Parents are present by the time this is
    /// called — the acceptance pipeline guarantees causal completeness.
    fn commit(&mut self, id: MessageId, message: SignedMessage<P>, bytes: Vec<u8>);

    /// The append frontier, in ascending id order.
    fn heads(&self) -> Vec<MessageId>;

    fn children(&self, id: &MessageId) -> Vec<MessageId>;

    fn ids(&self) -> Vec<MessageId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transitive causal predecessors of a message.
    fn ancestors(&self, id: &MessageId) -> HashSet<MessageId> {
        let mut result = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some(signed) = self.get(id) {
            queue.extend(signed.message.parents.iter().copied());
        }
        while let Some(current) = queue.pop_front() {
            if result.insert(current) {
                if let Some(signed) = self.get(&current) {
                    queue.extend(signed.message.parents.iter().copied());
                }
            }
        }
        result
    }
}

/// In-memory log store.
#[derive(Clone, Debug, Default)]
pub struct MemoryLogStore<P: Payload> {
    /// Message table: id → accepted envelope (decoded and canonical bytes).
    messages: HashMap<MessageId, (SignedMessage<P>, Vec<u8>)>,

    /// Head set: ids with no known children.
    heads: BTreeSet<MessageId>,

    /// Reverse parent index.
    children_index: HashMap<MessageId, HashSet<MessageId>>,
}

impl<P: Payload> MemoryLogStore<P> {
    pub fn new() -> Self {
        MemoryLogStore {
            messages: HashMap::new(),
            heads: BTreeSet::new(),
            children_index: HashMap::new(),
        }
    }

    /// Recompute heads and the children index from the message table, e.g.
    /// after loading a snapshot whose secondary state is suspect.
    pub fn rebuild_indexes(&mut self) {
        self.heads.clear();
        self.children_index.clear();

        for (id, (signed, _)) in &self.messages {
            for parent in &signed.message.parents {
                self.children_index
                    .entry(*parent)
                    .or_default()
                    .insert(*id);
            }
        }
        for id in self.messages.keys() {
            if !self.children_index.contains_key(id) {
                self.heads.insert(*id);
            }
        }
    }
}

impl<P: Payload> LogStore<P> for MemoryLogStore<P> {
    fn get(&self, id: &MessageId) -> Option<&SignedMessage<P>> {
        self.messages.get(id).map(|(signed, _)| signed)
    }

    fn get_bytes(&self, id: &MessageId) -> Option<&[u8]> {
        self.messages.get(id).map(|(_, bytes)| bytes.as_slice())
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.messages.contains_key(id)
    }

    fn clock(&self, id: &MessageId) -> Option<u64> {
        self.messages.get(id).map(|(signed, _)| signed.message.clock)
    }

    fn commit(&mut self, id: MessageId, message: SignedMessage<P>, bytes: Vec<u8>) {
        for parent in &message.message.parents {
            self.children_index.entry(*parent).or_default().insert(id);
            self.heads.remove(parent);
        }
        self.heads.insert(id);
        self.messages.insert(id, (message, bytes));
    }

    fn heads(&self) -> Vec<MessageId> {
        self.heads.iter().copied().collect()
    }

    fn children(&self, id: &MessageId) -> Vec<MessageId> {
        self.children_index
            .get(id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    fn ids(&self) -> Vec<MessageId> {
        self.messages.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Convenience for the sync layer: split a batch of wanted ids into those a
/// store already holds and those it still needs.
pub fn partition_known<P: Payload, S: LogStore<P>>(
    store: &S,
    ids: &[MessageId],
) -> (Vec<MessageId>, Vec<MessageId>) {
    let mut known = Vec::new();
    let mut needed = Vec::new();
    for id in ids {
        if store.contains(id) {
            known.push(*id);
        } else {
            needed.push(*id);
        }
    }
    (known, needed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crl_core::{Hash, Message, Signature, SignatureScheme};

    fn signed(clock: u64, parents: Vec<MessageId>, tag: u8) -> (MessageId, SignedMessage<Vec<u8>>) {
        let message = Message::new(clock, parents, vec![tag]);
        let digest = message.digest().unwrap();
        let signed = SignedMessage::new(
            message,
            Signature {
                scheme: SignatureScheme::Ed25519,
                public_key: vec![tag; 32],
                signature: vec![tag; 64],
                digest,
            },
        );
        (signed.derive_id().unwrap(), signed)
    }

    #[test]
    fn commit_moves_the_frontier() {
        let mut store = MemoryLogStore::new();
        let (root_id, root) = signed(0, vec![], 1);
        store.commit(root_id, root, vec![]);
        assert_eq!(store.heads(), vec![root_id]);

        let (child_id, child) = signed(1, vec![root_id], 2);
        store.commit(child_id, child, vec![]);
        assert_eq!(store.heads(), vec![child_id]);
        assert_eq!(store.children(&root_id), vec![child_id]);
    }

    #[test]
    fn rebuild_indexes_recovers_heads() {
        let mut store = MemoryLogStore::new();
        let (root_id, root) = signed(0, vec![], 1);
        let (a_id, a) = signed(1, vec![root_id], 2);
        let (b_id, b) = signed(1, vec![root_id], 3);
        store.commit(root_id, root, vec![]);
        store.commit(a_id, a, vec![]);
        store.commit(b_id, b, vec![]);

        let heads_before = store.heads();
        store.rebuild_indexes();
        assert_eq!(store.heads(), heads_before);
        assert_eq!(store.ancestors(&a_id), [root_id].into());
    }

    #[test]
    fn partition_splits_known_from_needed() {
        let mut store = MemoryLogStore::new();
        let (root_id, root) = signed(0, vec![], 1);
        store.commit(root_id, root, vec![]);
        let (missing_id, _) = signed(0, vec![], 9);

        let (known, needed) = partition_known(&store, &[root_id, missing_id]);
        assert_eq!(known, vec![root_id]);
        assert_eq!(needed, vec![missing_id]);
    }
}
