//! Two-replica demo: diverge two logs on the same topic, then run one sync
//! session each way and show the converged state.
//!
//! Run with `RUST_LOG=crl_sync=debug` to watch the session transitions.

use crl_core::Topic;
use crl_log::CausalLog;
use crl_signer::{Ed25519Signer, Signer, SignerCache, TopicAuthority};
use crl_sync::{
    MemoryNetwork, MemoryTransport, PeerId, SharedLog, SyncManager, SyncServer,
};
use parking_lot::RwLock;
use std::sync::Arc;

struct Replica {
    peer: PeerId,
    log: SharedLog<Vec<u8>>,
    manager: SyncManager<Vec<u8>>,
}

fn replica(name: &str, network: &MemoryNetwork) -> Replica {
    let topic = Topic::new("demo");
    let cache =
        SignerCache::with_signers(vec![Arc::new(Ed25519Signer::generate()) as Arc<dyn Signer>]);
    let log: SharedLog<Vec<u8>> = Arc::new(RwLock::new(CausalLog::new(
        topic.clone(),
        cache,
        TopicAuthority::open(topic),
    )));

    let peer = PeerId::new(name);
    network.register(peer.clone(), Arc::new(SyncServer::new(log.clone())));
    let manager = SyncManager::new(log.clone(), Arc::new(MemoryTransport::new(network.clone())));

    Replica { peer, log, manager }
}

fn report(label: &str, replica: &Replica) {
    let log = replica.log.read();
    let stats = log.stats();
    println!(
        "  {:<8} messages={:<3} heads={:<2} max_clock={:<3} root={}",
        label,
        stats.messages,
        stats.heads,
        stats.max_clock,
        log.root().hash.short(),
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let network = MemoryNetwork::new();
    let alice = replica("alice", &network);
    let bob = replica("bob", &network);

    // Shared root, then independent histories on each side.
    let root = alice
        .log
        .write()
        .create(b"root".to_vec())
        .expect("root append");
    bob.log.write().append(root).expect("root replication");

    for i in 0..3u8 {
        alice
            .log
            .write()
            .create(format!("alice-{}", i).into_bytes())
            .expect("local append");
    }
    for i in 0..5u8 {
        bob.log
            .write()
            .create(format!("bob-{}", i).into_bytes())
            .expect("local append");
    }

    println!("before sync:");
    report("alice", &alice);
    report("bob", &bob);

    let pulled = alice.manager.sync_with(&bob.peer).await;
    println!("\nalice <- bob: {:?}", pulled);
    let pulled = bob.manager.sync_with(&alice.peer).await;
    println!("bob <- alice: {:?}", pulled);

    println!("\nafter sync:");
    report("alice", &alice);
    report("bob", &bob);

    let converged = alice.log.read().root() == bob.log.read().root()
        && alice.log.read().heads() == bob.log.read().heads();
    println!(
        "\nconverged: {} ({} messages, heads: {:?})",
        converged,
        alice.log.read().len(),
        alice
            .log
            .read()
            .heads()
            .iter()
            .map(|h| h.short())
            .collect::<Vec<_>>(),
    );
}
