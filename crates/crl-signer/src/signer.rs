//! The signer capability contract.

use crate::error::{SignerError, VerificationError};
use crl_core::{Hash, Signature, SignatureScheme};

/// Exported key material for a signer, e.g. for session persistence.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyExport {
    pub scheme: SignatureScheme,
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for KeyExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of debug output.
        f.debug_struct("KeyExport")
            .field("scheme", &self.scheme)
            .field("private_key", &format!("<{} bytes>", self.private_key.len()))
            .finish()
    }
}

/// A signing capability: produces and verifies signatures over canonical
/// message digests.
///
/// One implementation per scheme; the log holds them behind `dyn Signer` in
/// a [`crate::SignerCache`] and picks the first entry for outgoing messages.
pub trait Signer: Send + Sync {
    /// Stable identifier for this signer instance, usable in logs and peer
    /// handshakes.
    fn uri(&self) -> String;

    /// Payload codecs this signer is willing to sign. The core treats
    /// payloads as opaque, so the default is the raw byte codec.
    fn codecs(&self) -> &'static [&'static str] {
        &["raw"]
    }

    fn scheme(&self) -> SignatureScheme;

    fn public_key(&self) -> Vec<u8>;

    /// Sign a canonical message digest.
    fn sign(&self, digest: &Hash) -> Result<Signature, SignerError>;

    /// Verify a signature produced by this signer's scheme.
    fn verify(&self, signature: &Signature, digest: &Hash) -> Result<(), VerificationError>;

    /// Export the private key material.
    fn export(&self) -> KeyExport;
}
