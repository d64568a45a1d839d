//! Canonical binary encoding for messages and signed envelopes.
//!
//! Identity in the log is `sha256(envelope bytes)`, so the byte layout here
//! is a protocol contract: fixed little-endian integer widths, length
//! prefixes, stable field order. serde formats are deliberately not used for
//! identity; they make no canonicality promise across versions.
//!
//! Layout of a message:
//!
//! ```text
//! clock        u64 LE
//! parent count u32 LE
//! parents      count * 32 bytes, in stored (canonical) order
//! payload len  u64 LE
//! payload      bytes
//! ```
//!
//! A signed envelope appends the signature fields:
//!
//! ```text
//! scheme tag   u8
//! pubkey len   u32 LE, pubkey bytes
//! sig len      u32 LE, sig bytes
//! digest       32 bytes
//! ```

use crate::hash::Hash;
use crate::message::{Message, MessageId, Payload, Signature, SignatureScheme, SignedMessage};
use thiserror::Error;

/// Failures to canonically encode or decode a message.
///
/// Fatal to the submission that produced them; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("payload cannot be canonically encoded: {0}")]
    Payload(String),

    #[error("truncated input while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("trailing bytes after envelope")]
    TrailingBytes,

    #[error("unknown signature scheme tag: {0}")]
    UnknownScheme(u8),

    #[error("length field too large for this platform")]
    LengthOverflow,
}

/// Encode a message into its canonical byte form.
pub fn encode_message<P: Payload>(message: &Message<P>) -> Result<Vec<u8>, EncodingError> {
    let payload = message.payload.to_bytes()?;

    let mut out = Vec::with_capacity(8 + 4 + message.parents.len() * 32 + 8 + payload.len());
    out.extend_from_slice(&message.clock.to_le_bytes());
    out.extend_from_slice(&(message.parents.len() as u32).to_le_bytes());
    for parent in &message.parents {
        out.extend_from_slice(parent.as_bytes());
    }
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Encode a signed envelope: message bytes followed by the signature fields.
pub fn encode_signed<P: Payload>(signed: &SignedMessage<P>) -> Result<Vec<u8>, EncodingError> {
    let mut out = encode_message(&signed.message)?;
    let sig = &signed.signature;
    out.push(sig.scheme.tag());
    out.extend_from_slice(&(sig.public_key.len() as u32).to_le_bytes());
    out.extend_from_slice(&sig.public_key);
    out.extend_from_slice(&(sig.signature.len() as u32).to_le_bytes());
    out.extend_from_slice(&sig.signature);
    out.extend_from_slice(sig.digest.as_bytes());
    Ok(out)
}

/// Decode a signed envelope from canonical bytes.
///
/// The decoder preserves the received parent order verbatim; a non-canonical
/// order is the acceptance pipeline's problem to reject, not the decoder's to
/// repair, because repairing it would change the derived id.
pub fn decode_signed<P: Payload>(bytes: &[u8]) -> Result<SignedMessage<P>, EncodingError> {
    let mut reader = Reader::new(bytes);

    let clock = reader.read_u64("clock")?;
    let parent_count = reader.read_u32("parent count")? as usize;
    let mut parents = Vec::with_capacity(parent_count.min(1024));
    for _ in 0..parent_count {
        parents.push(MessageId(Hash::from_bytes(reader.read_hash("parent id")?)));
    }
    let payload_len = usize::try_from(reader.read_u64("payload length")?)
        .map_err(|_| EncodingError::LengthOverflow)?;
    let payload = P::from_bytes(reader.read_slice(payload_len, "payload")?)?;

    let tag = reader.read_u8("scheme tag")?;
    let scheme = SignatureScheme::from_tag(tag).ok_or(EncodingError::UnknownScheme(tag))?;
    let pk_len = reader.read_u32("public key length")? as usize;
    let public_key = reader.read_slice(pk_len, "public key")?.to_vec();
    let sig_len = reader.read_u32("signature length")? as usize;
    let signature = reader.read_slice(sig_len, "signature")?.to_vec();
    let digest = Hash::from_bytes(reader.read_hash("digest")?);

    reader.finish()?;

    Ok(SignedMessage {
        message: Message {
            clock,
            parents,
            payload,
        },
        signature: Signature {
            scheme,
            public_key,
            signature,
            digest,
        },
    })
}

/// Cursor over an input slice with typed reads.
struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Reader { input, pos: 0 }
    }

    fn read_slice(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], EncodingError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(EncodingError::LengthOverflow)?;
        if end > self.input.len() {
            return Err(EncodingError::UnexpectedEof(field));
        }
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, EncodingError> {
        Ok(self.read_slice(1, field)?[0])
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, EncodingError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read_slice(4, field)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, EncodingError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read_slice(8, field)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_hash(&mut self, field: &'static str) -> Result<[u8; 32], EncodingError> {
        let mut buf = [0u8; 32];
        buf.copy_from_slice(self.read_slice(32, field)?);
        Ok(buf)
    }

    fn finish(self) -> Result<(), EncodingError> {
        if self.pos == self.input.len() {
            Ok(())
        } else {
            Err(EncodingError::TrailingBytes)
        }
    }
}
