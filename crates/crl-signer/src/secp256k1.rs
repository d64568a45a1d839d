//! secp256k1 ECDSA signer (k256), the scheme used by Ethereum-style chains.

use crate::error::{SignerError, VerificationError};
use crate::signer::{KeyExport, Signer};
use crate::verify::verify_secp256k1;
use crl_core::{Hash, Signature, SignatureScheme};
use k256::ecdsa::signature::Signer as _;
use k256::ecdsa::SigningKey;

/// secp256k1 signing capability.
///
/// Public keys travel in 33-byte SEC1 compressed form; signatures are
/// 64-byte fixed-width (r || s) with RFC 6979 deterministic nonces.
pub struct Secp256k1Signer {
    key: SigningKey,
}

impl Secp256k1Signer {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        Secp256k1Signer {
            key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Rebuild a signer from raw scalar bytes (e.g. a prior `export`).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(bytes)
            .map_err(|_| SignerError::InvalidKey(SignatureScheme::Secp256k1))?;
        Ok(Secp256k1Signer { key })
    }
}

impl Signer for Secp256k1Signer {
    fn uri(&self) -> String {
        format!("causeway:secp256k1:{}", Hash::digest(&self.public_key()).short())
    }

    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Secp256k1
    }

    fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_sec1_bytes().to_vec()
    }

    fn sign(&self, digest: &Hash) -> Result<Signature, SignerError> {
        let signature: k256::ecdsa::Signature = self.key.sign(digest.as_bytes());
        Ok(Signature {
            scheme: SignatureScheme::Secp256k1,
            public_key: self.public_key(),
            signature: signature.to_bytes().to_vec(),
            digest: *digest,
        })
    }

    fn verify(&self, signature: &Signature, digest: &Hash) -> Result<(), VerificationError> {
        if signature.digest != *digest {
            return Err(VerificationError::DigestMismatch);
        }
        verify_secp256k1(signature, digest)
    }

    fn export(&self) -> KeyExport {
        KeyExport {
            scheme: SignatureScheme::Secp256k1,
            private_key: self.key.to_bytes().to_vec(),
        }
    }
}
