//! End-to-end sync sessions between in-memory replicas.
//!
//! Covers the divergence/convergence scenarios from the protocol contract:
//! concurrent branches merging, no-op syncs, cooldown and backoff admission,
//! the consecutive-failure cap, and in-session parent ordering.

use crl_core::Topic;
use crl_log::{CausalLog, LogStore};
use crl_signer::{Ed25519Signer, Signer, SignerCache, TopicAuthority};
use crl_sync::{
    MemoryNetwork, MemoryTransport, PeerId, SessionState, SharedLog, SyncConfigBuilder,
    SyncEvent, SyncManager, SyncOutcome, SyncServer,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

struct Replica {
    peer: PeerId,
    log: SharedLog<Vec<u8>>,
    manager: SyncManager<Vec<u8>>,
}

impl Replica {
    /// A replica with no cooldown, so tests can run repeated rounds.
    fn new(name: &str, network: &MemoryNetwork) -> Self {
        Self::with_transport(name, network, MemoryTransport::new(network.clone()))
    }

    fn with_transport(name: &str, network: &MemoryNetwork, transport: MemoryTransport) -> Self {
        let topic = Topic::new("sessions");
        let cache = SignerCache::with_signers(vec![
            Arc::new(Ed25519Signer::generate()) as Arc<dyn Signer>
        ]);
        let log: SharedLog<Vec<u8>> = Arc::new(RwLock::new(CausalLog::new(
            topic.clone(),
            cache,
            TopicAuthority::open(topic),
        )));
        let peer = PeerId::new(name);
        network.register(peer.clone(), Arc::new(SyncServer::new(log.clone())));

        let config = SyncConfigBuilder::new()
            .cooldown(Duration::ZERO)
            .build();
        let manager = SyncManager::with_config(log.clone(), Arc::new(transport), config);
        Replica { peer, log, manager }
    }

    fn ids(&self) -> BTreeSet<crl_core::MessageId> {
        self.log.read().store().ids().into_iter().collect()
    }
}

async fn full_round(replicas: &[Replica]) {
    for a in replicas {
        for b in replicas {
            if a.peer != b.peer {
                a.manager.sync_with(&b.peer).await;
            }
        }
    }
}

fn converged(replicas: &[Replica]) -> bool {
    let reference = replicas[0].ids();
    replicas.iter().all(|r| {
        r.ids() == reference
            && r.log.read().heads() == replicas[0].log.read().heads()
            && r.log.read().root() == replicas[0].log.read().root()
    })
}

#[tokio::test]
async fn concurrent_branches_merge_to_identical_state() {
    let network = MemoryNetwork::new();
    let a = Replica::new("a", &network);
    let b = Replica::new("b", &network);

    // Shared root, then divergence: A appends a1; B appends b1 <- b2.
    let root = a.log.write().create(b"root".to_vec()).unwrap();
    b.log.write().append(root).unwrap();

    let a1 = a.log.write().create(b"a1".to_vec()).unwrap();
    let b1 = b.log.write().create(b"b1".to_vec()).unwrap();
    let b2 = b.log.write().create(b"b2".to_vec()).unwrap();

    // One session each way.
    let outcome = a.manager.sync_with(&b.peer).await;
    assert!(
        matches!(outcome, SyncOutcome::Completed { applied: 2, rejected: 0, .. }),
        "unexpected outcome: {:?}",
        outcome
    );
    b.manager.sync_with(&a.peer).await;

    // Both hold {root, a1, b1, b2}; heads are the concurrent tips a1 and b2.
    assert_eq!(a.ids().len(), 4);
    assert_eq!(a.ids(), b.ids());

    let mut expected_heads = vec![a1.derive_id().unwrap(), b2.derive_id().unwrap()];
    expected_heads.sort();
    assert_eq!(a.log.read().heads(), expected_heads);
    assert_eq!(b.log.read().heads(), expected_heads);
    assert_eq!(a.log.read().root(), b.log.read().root());

    // Clocks survived transfer: b2 sits two past the root.
    let b2_id = b2.derive_id().unwrap();
    assert_eq!(a.log.read().get(&b2_id).unwrap().clock, 2);
    let b1_id = b1.derive_id().unwrap();
    assert_eq!(a.log.read().get(&b1_id).unwrap().clock, 1);
}

#[tokio::test]
async fn matching_roots_short_circuit() {
    let network = MemoryNetwork::new();
    let a = Replica::new("a", &network);
    let b = Replica::new("b", &network);

    let root = a.log.write().create(b"root".to_vec()).unwrap();
    b.log.write().append(root).unwrap();

    let outcome = a.manager.sync_with(&b.peer).await;
    assert!(matches!(outcome, SyncOutcome::NoDivergence));
    assert_eq!(a.manager.session_state(&b.peer), SessionState::Cooldown);
}

#[tokio::test(start_paused = true)]
async fn cooldown_refuses_then_readmits() {
    let network = MemoryNetwork::new();
    let a = Replica::new("a", &network);
    let b = Replica::new("b", &network);

    // Managers in this test need a real quiet period.
    let config = SyncConfigBuilder::new()
        .cooldown(Duration::from_secs(20))
        .build();
    let manager: SyncManager<Vec<u8>> = SyncManager::with_config(
        a.log.clone(),
        Arc::new(MemoryTransport::new(network.clone())),
        config,
    );

    assert!(matches!(
        manager.sync_with(&b.peer).await,
        SyncOutcome::NoDivergence
    ));
    assert!(matches!(
        manager.sync_with(&b.peer).await,
        SyncOutcome::CoolingDown
    ));

    tokio::time::advance(Duration::from_secs(21)).await;
    assert!(matches!(
        manager.sync_with(&b.peer).await,
        SyncOutcome::NoDivergence
    ));
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_back_off_then_fail_the_peer() {
    let network = MemoryNetwork::new();
    let a = Replica::new("a", &network);
    let b = Replica::new("b", &network);

    // Every request is dropped on the floor.
    let config = SyncConfigBuilder::new()
        .cooldown(Duration::ZERO)
        .base_backoff(Duration::from_millis(100))
        .max_consecutive_failures(3)
        .build();
    let manager: SyncManager<Vec<u8>> = SyncManager::with_config(
        a.log.clone(),
        Arc::new(MemoryTransport::lossy(network.clone(), 1.0, 7)),
        config,
    );
    let mut events = manager.subscribe();

    // First failure enters backoff, and the gate holds until it expires.
    assert!(matches!(
        manager.sync_with(&b.peer).await,
        SyncOutcome::Failed(_)
    ));
    assert_eq!(manager.session_state(&b.peer), SessionState::Backoff);
    assert!(matches!(
        manager.sync_with(&b.peer).await,
        SyncOutcome::BackingOff
    ));

    // Drive to the consecutive-failure cap.
    let mut peer_failed = false;
    for _ in 0..2 {
        tokio::time::advance(Duration::from_secs(120)).await;
        if let SyncOutcome::PeerFailed(_) = manager.sync_with(&b.peer).await {
            peer_failed = true;
        }
    }
    assert!(peer_failed);
    assert_eq!(manager.session_state(&b.peer), SessionState::Failed);

    // Failed stays failed without a reset...
    assert!(matches!(
        manager.sync_with(&b.peer).await,
        SyncOutcome::PeerFailed(_)
    ));
    manager.reset_peer(&b.peer);
    assert_eq!(manager.session_state(&b.peer), SessionState::Idle);

    // ...and the failure surfaced as an event for the transport layer.
    let mut saw_peer_failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::PeerFailed(_)) {
            saw_peer_failed = true;
        }
    }
    assert!(saw_peer_failed);
}

#[tokio::test]
async fn three_replicas_converge_after_partition_heals() {
    let network = MemoryNetwork::new();
    let replicas = [
        Replica::new("r0", &network),
        Replica::new("r1", &network),
        Replica::new("r2", &network),
    ];

    // Shared root everywhere.
    let root = replicas[0].log.write().create(b"root".to_vec()).unwrap();
    replicas[1].log.write().append(root.clone()).unwrap();
    replicas[2].log.write().append(root).unwrap();

    // Partition: r2 is isolated while everyone writes.
    replicas[0].log.write().create(b"from r0".to_vec()).unwrap();
    replicas[1].log.write().create(b"from r1".to_vec()).unwrap();
    replicas[2].log.write().create(b"from r2".to_vec()).unwrap();

    replicas[0].manager.sync_with(&replicas[1].peer).await;
    replicas[1].manager.sync_with(&replicas[0].peer).await;
    assert_eq!(replicas[0].ids(), replicas[1].ids());
    assert_ne!(replicas[0].ids(), replicas[2].ids());

    // Heal: a couple of full rounds settle everyone.
    full_round(&replicas).await;
    full_round(&replicas).await;

    assert!(converged(&replicas));
    assert_eq!(replicas[0].ids().len(), 4);
    assert_eq!(replicas[0].log.read().heads().len(), 3);
}

#[tokio::test]
async fn chained_history_applies_in_causal_order() {
    let network = MemoryNetwork::new();
    let a = Replica::new("a", &network);
    let b = Replica::new("b", &network);

    // B holds a 12-deep chain; A has nothing. Fetch order is id order, which
    // is unrelated to causal order, so the apply queue has to reorder.
    for i in 0..12u8 {
        b.log.write().create(vec![i]).unwrap();
    }

    let outcome = a.manager.sync_with(&b.peer).await;
    assert!(
        matches!(outcome, SyncOutcome::Completed { applied: 12, rejected: 0, .. }),
        "unexpected outcome: {:?}",
        outcome
    );
    assert_eq!(a.ids(), b.ids());
    assert_eq!(a.log.read().stats().max_clock, 11);
}

#[tokio::test]
async fn shutdown_cancels_future_sessions() {
    let network = MemoryNetwork::new();
    let a = Replica::new("a", &network);
    let b = Replica::new("b", &network);

    a.manager.shutdown();
    assert!(matches!(
        a.manager.sync_with(&b.peer).await,
        SyncOutcome::Failed(_)
    ));
}
