//! Message model: the signed, content-addressed unit of the causal log.
//!
//! A [`Message`] carries a logical clock, an ordered set of parent ids and an
//! opaque payload. Wrapping it with a [`Signature`] yields a
//! [`SignedMessage`], whose canonical encoding is hashed to produce the
//! [`MessageId`] under which it is stored and replicated.

use crate::encode::{self, EncodingError};
use crate::hash::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace scoping one independent log instance.
///
/// Each topic has its own store, tree index and head set; messages never move
/// between topics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Topic(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content address of a signed message: `sha256(canonical envelope bytes)`.
///
/// Primary key in the log store and leaf key in the tree index.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug,
)]
pub struct MessageId(pub Hash);

impl MessageId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn short(&self) -> String {
        self.0.short()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload contract: the core never looks inside a payload beyond asking it
/// to round-trip through bytes.
pub trait Payload: Clone + Send + Sync + 'static {
    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError>;
}

/// Raw bytes are the identity payload.
impl Payload for Vec<u8> {
    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(self.clone())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        Ok(bytes.to_vec())
    }
}

/// Supported signature schemes, tagged for wire dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureScheme {
    Ed25519,
    Secp256k1,
}

impl SignatureScheme {
    /// Wire tag byte for the canonical envelope encoding.
    pub fn tag(&self) -> u8 {
        match self {
            SignatureScheme::Ed25519 => 0,
            SignatureScheme::Secp256k1 => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SignatureScheme::Ed25519),
            1 => Some(SignatureScheme::Secp256k1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureScheme::Ed25519 => "ed25519",
            SignatureScheme::Secp256k1 => "secp256k1",
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A signature over the canonical encoding of a [`Message`].
///
/// `digest` is the SHA-256 of the message's canonical bytes; it is what the
/// scheme actually signed, and verifiers recompute it before checking the
/// signature bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub scheme: SignatureScheme,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub digest: Hash,
}

/// A causal log message.
///
/// Invariant: `clock == 0` iff `parents` is empty, otherwise
/// `clock == 1 + max(parent clocks)`. The invariant is enforced at
/// acceptance, not here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<P: Payload> {
    /// Logical clock position in the DAG.
    pub clock: u64,

    /// Causal predecessors, in canonical (ascending id) order.
    pub parents: Vec<MessageId>,

    /// Opaque application payload.
    pub payload: P,
}

impl<P: Payload> Message<P> {
    /// Build a message with its parents put into canonical order.
    ///
    /// Duplicate parents are not removed here; they are rejected at
    /// acceptance so that a malformed remote message fails loudly instead of
    /// being silently rewritten into a different identity.
    pub fn new(clock: u64, mut parents: Vec<MessageId>, payload: P) -> Self {
        parents.sort();
        Message {
            clock,
            parents,
            payload,
        }
    }

    /// A root message: no parents, clock zero.
    pub fn root(payload: P) -> Self {
        Message {
            clock: 0,
            parents: Vec::new(),
            payload,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// SHA-256 of the canonical message encoding; the bytes a signer signs.
    pub fn digest(&self) -> Result<Hash, EncodingError> {
        Ok(Hash::digest(&encode::encode_message(self)?))
    }
}

/// A message plus the signature that admits it to the log.
///
/// Owned exclusively by the log store once accepted; never mutated after.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage<P: Payload> {
    pub message: Message<P>,
    pub signature: Signature,
}

impl<P: Payload> SignedMessage<P> {
    pub fn new(message: Message<P>, signature: Signature) -> Self {
        SignedMessage { message, signature }
    }

    /// Derive the content address of this envelope.
    ///
    /// Two independently created envelopes with identical contents derive the
    /// same id and merge without duplication.
    pub fn derive_id(&self) -> Result<MessageId, EncodingError> {
        Ok(MessageId(Hash::digest(&encode::encode_signed(self)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> MessageId {
        MessageId(Hash::digest(&[n]))
    }

    #[test]
    fn parents_are_canonically_ordered() {
        let a = id(1);
        let b = id(2);
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };

        let m1 = Message::new(1, vec![a, b], vec![0u8]);
        let m2 = Message::new(1, vec![b, a], vec![0u8]);
        assert_eq!(m1.parents, vec![lo, hi]);
        assert_eq!(m1, m2);
    }

    #[test]
    fn root_has_no_parents() {
        let m = Message::root(b"snapshot".to_vec());
        assert!(m.is_root());
        assert_eq!(m.clock, 0);
    }

    #[test]
    fn identical_content_identical_id() {
        let msg = Message::new(0, vec![], b"payload".to_vec());
        let sig = Signature {
            scheme: SignatureScheme::Ed25519,
            public_key: vec![1; 32],
            signature: vec![2; 64],
            digest: msg.digest().unwrap(),
        };
        let s1 = SignedMessage::new(msg.clone(), sig.clone());
        let s2 = SignedMessage::new(msg, sig);
        assert_eq!(s1.derive_id().unwrap(), s2.derive_id().unwrap());
    }

    #[test]
    fn scheme_tags_round_trip() {
        for scheme in [SignatureScheme::Ed25519, SignatureScheme::Secp256k1] {
            assert_eq!(SignatureScheme::from_tag(scheme.tag()), Some(scheme));
        }
        assert_eq!(SignatureScheme::from_tag(250), None);
    }
}
