//! Errors crossing the signature boundary.

use crl_core::{SignatureScheme, Topic};
use thiserror::Error;

/// Failures while producing a signature.
#[derive(Error, Debug, Clone)]
pub enum SignerError {
    #[error("invalid private key material for {0}")]
    InvalidKey(SignatureScheme),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Failures while verifying an inbound message's signature.
///
/// All of these are permanent rejections: the message is discarded and never
/// retried, per the acceptance rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("signature digest does not match the message's canonical digest")]
    DigestMismatch,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed public key for {0}")]
    MalformedKey(SignatureScheme),

    #[error("malformed signature bytes for {0}")]
    MalformedSignature(SignatureScheme),

    #[error("signer {0} is not authorized for topic {1}")]
    UnauthorizedSigner(String, Topic),
}
