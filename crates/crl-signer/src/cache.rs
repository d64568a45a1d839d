//! Per-topic signer cache and authorization set.
//!
//! Both are plain values owned by the log instance they serve — constructed
//! with it, dropped with it. There is no process-global signer state.

use crate::error::VerificationError;
use crate::signer::Signer;
use crl_core::{Signature, Topic};
use std::collections::HashSet;
use std::sync::Arc;

/// Ordered list of usable signers for one topic.
///
/// The first entry is the default signer for new outgoing messages.
/// Replacing the list (session renewal) does not retroactively affect
/// messages already signed.
#[derive(Clone, Default)]
pub struct SignerCache {
    signers: Vec<Arc<dyn Signer>>,
}

impl SignerCache {
    pub fn new() -> Self {
        SignerCache {
            signers: Vec::new(),
        }
    }

    pub fn with_signers(signers: Vec<Arc<dyn Signer>>) -> Self {
        SignerCache { signers }
    }

    /// The default signer for outgoing messages.
    pub fn first(&self) -> Option<&Arc<dyn Signer>> {
        self.signers.first()
    }

    pub fn push(&mut self, signer: Arc<dyn Signer>) {
        self.signers.push(signer);
    }

    /// Swap the whole list, e.g. on session renewal.
    pub fn replace(&mut self, signers: Vec<Arc<dyn Signer>>) {
        self.signers = signers;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Signer>> {
        self.signers.iter()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

/// The set of public keys allowed to write to a topic.
///
/// `open` topics accept any verifiable signer; `restricted` topics accept
/// only the registered keys. Consulted by the acceptance pipeline after the
/// signature itself checks out.
#[derive(Clone, Debug)]
pub struct TopicAuthority {
    topic: Topic,
    /// `None` means open membership.
    authorized: Option<HashSet<Vec<u8>>>,
}

impl TopicAuthority {
    /// Any verifiable signer may write.
    pub fn open(topic: Topic) -> Self {
        TopicAuthority {
            topic,
            authorized: None,
        }
    }

    /// Only the given public keys may write.
    pub fn restricted(topic: Topic, keys: impl IntoIterator<Item = Vec<u8>>) -> Self {
        TopicAuthority {
            topic,
            authorized: Some(keys.into_iter().collect()),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Grant a key write access. On an open topic this switches the topic to
    /// restricted mode with the key as its only member.
    pub fn authorize(&mut self, key: Vec<u8>) {
        self.authorized.get_or_insert_with(HashSet::new).insert(key);
    }

    pub fn revoke(&mut self, key: &[u8]) {
        if let Some(keys) = self.authorized.as_mut() {
            keys.remove(key);
        }
    }

    pub fn is_authorized(&self, key: &[u8]) -> bool {
        match &self.authorized {
            None => true,
            Some(keys) => keys.contains(key),
        }
    }

    /// Authorization check for an inbound signature.
    pub fn check(&self, signature: &Signature) -> Result<(), VerificationError> {
        if self.is_authorized(&signature.public_key) {
            Ok(())
        } else {
            Err(VerificationError::UnauthorizedSigner(
                format!(
                    "{}:{}",
                    signature.scheme,
                    crl_core::Hash::digest(&signature.public_key).short()
                ),
                self.topic.clone(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::Ed25519Signer;
    use crate::signer::Signer as _;
    use crl_core::Hash;

    #[test]
    fn first_signer_is_the_default() {
        let a = Arc::new(Ed25519Signer::generate());
        let b = Arc::new(Ed25519Signer::generate());
        let mut cache = SignerCache::with_signers(vec![a.clone(), b.clone()]);

        assert_eq!(cache.first().unwrap().public_key(), a.public_key());

        // Renewal: replacement changes the default.
        cache.replace(vec![b.clone()]);
        assert_eq!(cache.first().unwrap().public_key(), b.public_key());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn open_topic_accepts_any_key() {
        let authority = TopicAuthority::open(Topic::new("t"));
        assert!(authority.is_authorized(b"anything"));
    }

    #[test]
    fn restricted_topic_rejects_unknown_keys() {
        let signer = Ed25519Signer::generate();
        let mut authority =
            TopicAuthority::restricted(Topic::new("t"), [signer.public_key()]);

        assert!(authority.is_authorized(&signer.public_key()));
        assert!(!authority.is_authorized(b"stranger"));

        let digest = Hash::digest(b"m");
        let signature = signer.sign(&digest).unwrap();
        assert!(authority.check(&signature).is_ok());

        authority.revoke(&signer.public_key());
        assert!(matches!(
            authority.check(&signature),
            Err(VerificationError::UnauthorizedSigner(_, _))
        ));
    }
}
