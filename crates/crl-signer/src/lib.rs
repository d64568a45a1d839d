//! # crl-signer
//!
//! The signature boundary of the Causeway replicated log: signer
//! capabilities, scheme-dispatched verification for inbound envelopes, and
//! the per-topic authorization context consulted before anything enters the
//! log.
//!
//! A scheme variant implements the same [`Signer`] contract
//! (`uri`/`codecs`/`sign`/`verify`/`export`); inbound verification instead
//! dispatches on the scheme tag carried in the [`crl_core::Signature`]
//! itself, since remote envelopes arrive with their own public key.

mod cache;
mod ed25519;
mod error;
mod secp256k1;
mod signer;
mod verify;

pub use cache::{SignerCache, TopicAuthority};
pub use ed25519::Ed25519Signer;
pub use error::{SignerError, VerificationError};
pub use secp256k1::Secp256k1Signer;
pub use signer::{KeyExport, Signer};
pub use verify::verify_signature;
