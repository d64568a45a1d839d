//! Ed25519 signer (ed25519-dalek).

use crate::error::{SignerError, VerificationError};
use crate::signer::{KeyExport, Signer};
use crate::verify::verify_ed25519;
use crl_core::{Hash, Signature, SignatureScheme};
use ed25519_dalek::{Signer as _, SigningKey};

/// Ed25519 signing capability.
///
/// Signatures are deterministic (RFC 8032 nonce derivation), so re-signing
/// the same digest reproduces the same envelope and therefore the same
/// message id.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        Ed25519Signer {
            key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Rebuild a signer from a 32-byte seed (e.g. a prior `export`).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Ed25519Signer {
            key: SigningKey::from_bytes(&seed),
        }
    }
}

impl Signer for Ed25519Signer {
    fn uri(&self) -> String {
        let public = self.key.verifying_key().to_bytes();
        format!("causeway:ed25519:{}", Hash::digest(&public).short())
    }

    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Ed25519
    }

    fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, SignerError> {
        let signature = self.key.sign(digest.as_bytes());
        Ok(Signature {
            scheme: SignatureScheme::Ed25519,
            public_key: self.public_key(),
            signature: signature.to_bytes().to_vec(),
            digest: *digest,
        })
    }

    fn verify(&self, signature: &Signature, digest: &Hash) -> Result<(), VerificationError> {
        if signature.digest != *digest {
            return Err(VerificationError::DigestMismatch);
        }
        verify_ed25519(signature, digest)
    }

    fn export(&self) -> KeyExport {
        KeyExport {
            scheme: SignatureScheme::Ed25519,
            private_key: self.key.to_bytes().to_vec(),
        }
    }
}
