//! Convergence properties: the tree shape is a pure function of the key set.

use crl_core::{Hash, MessageId};
use crl_mst::MerkleSearchTree;
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

fn id(n: u64) -> MessageId {
    MessageId(Hash::digest(&n.to_le_bytes()))
}

proptest! {
    #[test]
    fn permuted_insertions_converge(
        count in 0usize..120,
        seed in any::<u64>(),
    ) {
        let keys: Vec<_> = (0..count as u64).map(id).collect();
        let mut shuffled = keys.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let a = MerkleSearchTree::from_keys(keys);
        let b = MerkleSearchTree::from_keys(shuffled);
        prop_assert_eq!(a.root(), b.root());
    }

    #[test]
    fn inserts_and_removes_cancel(
        base in 0usize..80,
        extra in 1usize..40,
        seed in any::<u64>(),
    ) {
        let mut tree = MerkleSearchTree::from_keys((0..base as u64).map(id));
        let reference_root = tree.root();

        // Insert a batch of extra keys, then remove them in a shuffled order.
        let extras: Vec<_> = (1000..1000 + extra as u64).map(id).collect();
        for key in &extras {
            tree.insert(*key);
        }
        let mut removal_order = extras.clone();
        removal_order.shuffle(&mut StdRng::seed_from_u64(seed));
        for key in &removal_order {
            prop_assert!(tree.remove(key));
        }

        prop_assert_eq!(tree.root(), reference_root);
    }

    #[test]
    fn incremental_root_matches_scratch_root(
        count in 1usize..100,
        seed in any::<u64>(),
    ) {
        let mut keys: Vec<_> = (0..count as u64).map(id).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut incremental = MerkleSearchTree::new();
        for key in &keys {
            incremental.insert(*key);
        }
        let scratch = MerkleSearchTree::from_keys(keys);
        prop_assert_eq!(incremental.root(), scratch.root());
    }

    #[test]
    fn disjoint_sets_have_distinct_roots(
        split in 1usize..60,
    ) {
        let a = MerkleSearchTree::from_keys((0..split as u64).map(id));
        let b = MerkleSearchTree::from_keys((split as u64..split as u64 + 10).map(id));
        prop_assert_ne!(a.root(), b.root());
    }
}
