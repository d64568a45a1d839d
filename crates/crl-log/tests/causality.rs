//! Causal-order properties over randomly shaped histories.

use crl_core::{Message, MessageId, SignedMessage, Topic};
use crl_log::{AppendError, CausalLog, LogStore};
use crl_mst::MerkleSearchTree;
use crl_signer::{Ed25519Signer, Signer, SignerCache, TopicAuthority};
use proptest::prelude::*;
use std::sync::Arc;

fn open_log() -> (CausalLog<Vec<u8>>, Arc<Ed25519Signer>) {
    let signer = Arc::new(Ed25519Signer::generate());
    let cache = SignerCache::with_signers(vec![signer.clone() as Arc<dyn Signer>]);
    let topic = Topic::new("prop");
    let authority = TopicAuthority::open(topic.clone());
    (CausalLog::new(topic, cache, authority), signer)
}

fn sign(
    signer: &Ed25519Signer,
    clock: u64,
    parents: Vec<MessageId>,
    payload: Vec<u8>,
) -> SignedMessage<Vec<u8>> {
    let message = Message::new(clock, parents, payload);
    let digest = message.digest().unwrap();
    SignedMessage::new(message, signer.sign(&digest).unwrap())
}

proptest! {
    // Grow a DAG by repeatedly picking a random subset of existing ids as
    // parents; every accepted message must satisfy the clock rule and the
    // tree must track the store's id set exactly.
    #[test]
    fn random_histories_preserve_the_clock_invariant(
        choices in prop::collection::vec((any::<prop::sample::Index>(), 1usize..4), 1..40),
    ) {
        let (mut log, signer) = open_log();
        let mut ids: Vec<MessageId> = Vec::new();

        for (i, (index, width)) in choices.into_iter().enumerate() {
            let parents: Vec<MessageId> = if ids.is_empty() {
                Vec::new()
            } else {
                let mut picked: Vec<MessageId> = (0..width)
                    .map(|offset| ids[(index.index(ids.len()) + offset) % ids.len()])
                    .collect();
                picked.sort();
                picked.dedup();
                picked
            };

            let expected_clock = parents
                .iter()
                .map(|p| log.get(p).unwrap().clock + 1)
                .max()
                .unwrap_or(0);

            let signed = sign(&signer, expected_clock, parents.clone(), vec![i as u8]);
            let id = log.append(signed).unwrap();
            ids.push(id);

            let stored = log.get(&id).unwrap();
            prop_assert_eq!(stored.clock, expected_clock);
            for parent in &stored.parents {
                prop_assert!(log.has_message(parent));
                prop_assert!(log.get(parent).unwrap().clock < stored.clock);
            }
        }

        // The tree over exactly the stored ids matches the log's root.
        let scratch = MerkleSearchTree::from_keys(log.store().ids());
        prop_assert_eq!(scratch.root(), log.root());

        // Heads are precisely the ids without children.
        for head in log.heads() {
            prop_assert!(log.store().children(&head).is_empty());
        }
    }

    // Re-appending any prefix of a history is a no-op.
    #[test]
    fn replays_do_not_change_state(extra in 1usize..10) {
        let (mut log, signer) = open_log();

        let mut envelopes = Vec::new();
        let mut previous: Vec<MessageId> = Vec::new();
        for i in 0..extra {
            let clock = if previous.is_empty() { 0 } else { i as u64 };
            let signed = sign(&signer, clock, previous.clone(), vec![i as u8]);
            let id = log.append(signed.clone()).unwrap();
            envelopes.push(signed);
            previous = vec![id];
        }

        let root = log.root();
        let heads = log.heads();
        let len = log.len();

        for signed in envelopes {
            log.append(signed).unwrap();
        }
        prop_assert_eq!(log.root(), root);
        prop_assert_eq!(log.heads(), heads);
        prop_assert_eq!(log.len(), len);
    }
}

#[test]
fn unknown_parent_then_recovery() {
    let (mut log, signer) = open_log();

    let root = sign(&signer, 0, vec![], b"root".to_vec());
    let root_id = root.derive_id().unwrap();
    let orphan = sign(&signer, 1, vec![root_id], b"orphan".to_vec());

    match log.append(orphan.clone()) {
        Err(AppendError::MissingParents(missing)) => assert_eq!(missing, vec![root_id]),
        other => panic!("expected missing parents, got {:?}", other.map(|_| ())),
    }

    log.append(root).unwrap();
    let id = log.append(orphan).unwrap();
    assert_eq!(log.get(&id).unwrap().clock, 1);
}
