//! Scheme-dispatched verification for inbound messages.
//!
//! Inbound envelopes carry their own public key, so verification needs no
//! local signer instance: dispatch on the scheme tag and check the signature
//! bytes against the embedded key.

use crate::error::VerificationError;
use crl_core::{Hash, Signature, SignatureScheme};
use ed25519_dalek::Verifier as _;
use k256::ecdsa::signature::Verifier as _;

/// Verify a signature over the expected canonical digest.
///
/// Checks that the signature's embedded digest matches the digest recomputed
/// from the message, then verifies the signature bytes under the claimed
/// scheme. Any failure is a permanent rejection.
pub fn verify_signature(
    signature: &Signature,
    expected_digest: &Hash,
) -> Result<(), VerificationError> {
    if signature.digest != *expected_digest {
        return Err(VerificationError::DigestMismatch);
    }
    match signature.scheme {
        SignatureScheme::Ed25519 => verify_ed25519(signature, expected_digest),
        SignatureScheme::Secp256k1 => verify_secp256k1(signature, expected_digest),
    }
}

pub(crate) fn verify_ed25519(
    signature: &Signature,
    digest: &Hash,
) -> Result<(), VerificationError> {
    let key_bytes: [u8; 32] = signature
        .public_key
        .as_slice()
        .try_into()
        .map_err(|_| VerificationError::MalformedKey(SignatureScheme::Ed25519))?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| VerificationError::MalformedKey(SignatureScheme::Ed25519))?;

    let sig_bytes: [u8; 64] = signature
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| VerificationError::MalformedSignature(SignatureScheme::Ed25519))?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    key.verify(digest.as_bytes(), &sig)
        .map_err(|_| VerificationError::InvalidSignature)
}

pub(crate) fn verify_secp256k1(
    signature: &Signature,
    digest: &Hash,
) -> Result<(), VerificationError> {
    let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&signature.public_key)
        .map_err(|_| VerificationError::MalformedKey(SignatureScheme::Secp256k1))?;
    let sig = k256::ecdsa::Signature::from_slice(&signature.signature)
        .map_err(|_| VerificationError::MalformedSignature(SignatureScheme::Secp256k1))?;

    key.verify(digest.as_bytes(), &sig)
        .map_err(|_| VerificationError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::Ed25519Signer;
    use crate::secp256k1::Secp256k1Signer;
    use crate::signer::Signer;

    #[test]
    fn dispatch_verifies_both_schemes() {
        let digest = Hash::digest(b"message");

        let ed = Ed25519Signer::generate().sign(&digest).unwrap();
        assert!(verify_signature(&ed, &digest).is_ok());

        let secp = Secp256k1Signer::generate().sign(&digest).unwrap();
        assert!(verify_signature(&secp, &digest).is_ok());
    }

    #[test]
    fn flipped_signature_bit_is_invalid() {
        let digest = Hash::digest(b"message");
        let mut signature = Ed25519Signer::generate().sign(&digest).unwrap();
        signature.signature[0] ^= 0x01;

        assert_eq!(
            verify_signature(&signature, &digest),
            Err(VerificationError::InvalidSignature)
        );
    }

    #[test]
    fn wrong_scheme_tag_is_rejected() {
        let digest = Hash::digest(b"message");
        let mut signature = Ed25519Signer::generate().sign(&digest).unwrap();
        // Claim secp256k1 over ed25519 key material: key parse fails.
        signature.scheme = SignatureScheme::Secp256k1;

        assert!(matches!(
            verify_signature(&signature, &digest),
            Err(VerificationError::MalformedKey(_)) | Err(VerificationError::InvalidSignature)
        ));
    }

    #[test]
    fn digest_mismatch_is_rejected_before_crypto() {
        let digest = Hash::digest(b"message");
        let signature = Ed25519Signer::generate().sign(&digest).unwrap();

        assert_eq!(
            verify_signature(&signature, &Hash::digest(b"other")),
            Err(VerificationError::DigestMismatch)
        );
    }
}
