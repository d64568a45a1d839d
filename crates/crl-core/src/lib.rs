//! # crl-core
//!
//! Core types for the Causeway replicated log: the message model, the
//! canonical binary encoding that message identity is derived from, and the
//! causal clock rule.
//!
//! Everything here is pure and synchronous; storage, signing and sync live in
//! the sibling crates.

pub mod clock;
pub mod encode;
pub mod hash;
pub mod message;

pub use clock::{compute_clock, ClockError};
pub use encode::{decode_signed, encode_message, encode_signed, EncodingError};
pub use hash::{Hash, Hasher};
pub use message::{
    Message, MessageId, Payload, Signature, SignatureScheme, SignedMessage, Topic,
};
