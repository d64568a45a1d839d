//! The causal log: acceptance pipeline, frontier, and tree maintenance.

use crate::error::AppendError;
use crate::store::{LogStore, MemoryLogStore};
use crl_core::{
    compute_clock, encode_signed, Message, MessageId, Payload, SignedMessage, Topic,
};
use crl_mst::{MerkleSearchTree, Node, NodeKey, TreeError};
use crl_signer::{verify_signature, SignerCache, TopicAuthority};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Callback invoked after a message commits, in causal order.
pub type AppendListener<P> = Box<dyn Fn(MessageId, &Message<P>) + Send + Sync>;

/// One topic's causal log: store, tree index, signer context and listeners.
///
/// Validate-then-commit: every check in [`CausalLog::append`] runs before
/// anything is written, so a rejected message is invisible to `get`, the
/// head set and the tree alike.
pub struct CausalLog<P: Payload, S: LogStore<P> = MemoryLogStore<P>> {
    topic: Topic,
    store: S,
    tree: MerkleSearchTree,
    signers: SignerCache,
    authority: TopicAuthority,
    listeners: Vec<AppendListener<P>>,
}

impl<P: Payload> CausalLog<P, MemoryLogStore<P>> {
    /// A log over the in-memory store.
    pub fn new(topic: Topic, signers: SignerCache, authority: TopicAuthority) -> Self {
        Self::with_store(MemoryLogStore::new(), topic, signers, authority)
    }
}

impl<P: Payload, S: LogStore<P>> CausalLog<P, S> {
    pub fn with_store(
        store: S,
        topic: Topic,
        signers: SignerCache,
        authority: TopicAuthority,
    ) -> Self {
        let tree = MerkleSearchTree::from_keys(store.ids());
        CausalLog {
            topic,
            store,
            tree,
            signers,
            authority,
            listeners: Vec::new(),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn signers(&self) -> &SignerCache {
        &self.signers
    }

    pub fn signers_mut(&mut self) -> &mut SignerCache {
        &mut self.signers
    }

    pub fn authority(&self) -> &TopicAuthority {
        &self.authority
    }

    pub fn authority_mut(&mut self) -> &mut TopicAuthority {
        &mut self.authority
    }

    /// Register a causal-order delivery callback. Listeners see each message
    /// exactly after it commits, which is after all of its parents.
    pub fn on_append(&mut self, listener: AppendListener<P>) {
        self.listeners.push(listener);
    }

    /// Run the full acceptance pipeline on a signed message.
    ///
    /// Idempotent: appending an already-present id is a no-op returning the
    /// existing id. Recoverable failure is exactly
    /// [`AppendError::MissingParents`]; the caller fetches those ids and
    /// retries with the same envelope.
    pub fn append(&mut self, signed: SignedMessage<P>) -> Result<MessageId, AppendError> {
        let id = signed.derive_id()?;
        if self.store.contains(&id) {
            return Ok(id);
        }

        // Signature boundary: digest, signature bytes, then authorization.
        let digest = signed.message.digest()?;
        verify_signature(&signed.signature, &digest)?;
        self.authority.check(&signed.signature)?;

        // Structural checks: canonical parent order, then the clock rule.
        for pair in signed.message.parents.windows(2) {
            if pair[0] == pair[1] {
                return Err(AppendError::DuplicateParent(pair[0]));
            }
            if pair[0] > pair[1] {
                return Err(AppendError::NonCanonicalParents);
            }
        }
        let expected = compute_clock(&signed.message.parents, |p| self.store.clock(p))?;
        if expected != signed.message.clock {
            return Err(AppendError::ClockMismatch {
                claimed: signed.message.clock,
                expected,
            });
        }

        // Commit: store row + parent index + heads, then the tree leaf.
        let bytes = encode_signed(&signed)?;
        let message = signed.message.clone();
        self.store.commit(id, signed, bytes);
        self.tree.insert(id);

        for listener in &self.listeners {
            listener(id, &message);
        }

        Ok(id)
    }

    /// Create, sign and append a local message on top of the current heads.
    ///
    /// Returns the full envelope so the caller can hand it to peers without
    /// re-reading the store.
    pub fn create(&mut self, payload: P) -> Result<SignedMessage<P>, AppendError> {
        let parents = self.store.heads();
        let clock = compute_clock(&parents, |p| self.store.clock(p))?;
        let message = Message::new(clock, parents, payload);
        let digest = message.digest()?;

        let signer = self.signers.first().ok_or(AppendError::NoSigner)?;
        let signature = signer.sign(&digest)?;
        let signed = SignedMessage::new(message, signature);
        self.append(signed.clone())?;
        Ok(signed)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message<P>> {
        self.store.get(id).map(|signed| &signed.message)
    }

    pub fn get_signed(&self, id: &MessageId) -> Option<&SignedMessage<P>> {
        self.store.get(id)
    }

    pub fn has_message(&self, id: &MessageId) -> bool {
        self.store.contains(id)
    }

    pub fn heads(&self) -> Vec<MessageId> {
        self.store.heads()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Root of the tree index (point-in-time snapshot value).
    pub fn root(&self) -> Node {
        self.tree.root()
    }

    /// Children of a tree node, for serving sync walks.
    pub fn children(&self, level: u32, key: NodeKey) -> Result<Vec<Node>, TreeError> {
        self.tree.children(level, key)
    }

    /// Hash of the local tree node at `(level, key)`, if one exists. Used by
    /// the diffing side to prune matching subtrees.
    pub fn node_hash(&self, level: u32, key: NodeKey) -> Option<crl_core::Hash> {
        self.tree.node_hash(level, key)
    }

    /// Canonical envelope bytes for a batch of ids, serving sync pulls.
    /// Unknown ids are skipped, mirroring the wire contract.
    pub fn get_values(&self, ids: &[MessageId]) -> Vec<Vec<u8>> {
        ids.iter()
            .filter_map(|id| self.store.get_bytes(id).map(|b| b.to_vec()))
            .collect()
    }

    /// Ids reachable through the ancestry of `ids` that are not present
    /// locally, in ascending order. What a targeted fetch should ask a peer
    /// for before retrying a parent-blocked message.
    pub fn missing_ancestors(&self, ids: &[MessageId]) -> Vec<MessageId> {
        let mut missing = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<MessageId> = ids.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            match self.store.get(&id) {
                Some(signed) => queue.extend(signed.message.parents.iter().copied()),
                None => {
                    missing.insert(id);
                }
            }
        }

        missing.into_iter().collect()
    }

    pub fn stats(&self) -> LogStats {
        let max_clock = self
            .store
            .ids()
            .iter()
            .filter_map(|id| self.store.clock(id))
            .max()
            .unwrap_or(0);
        LogStats {
            messages: self.store.len(),
            heads: self.store.heads().len(),
            max_clock,
        }
    }
}

/// Point-in-time counters for one topic's log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogStats {
    pub messages: usize,
    pub heads: usize,
    pub max_clock: u64,
}
