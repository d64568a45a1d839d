//! Transport seam and the in-memory implementation.
//!
//! The real transport/discovery layer lives outside this core; it owes us a
//! request/response exchange per connected peer and nothing more. The
//! in-memory transport wires peers straight to each other's handlers and can
//! inject failures, which is how the backoff path gets exercised in tests.

use crate::error::TransportError;
use crate::server::RequestHandler;
use crate::wire::{PeerId, SyncRequest, SyncResponse};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Carries one sync request to a peer and returns its response.
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    async fn request(
        &self,
        peer: &PeerId,
        request: SyncRequest,
    ) -> Result<SyncResponse, TransportError>;
}

/// Registry connecting in-memory peers by id.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    handlers: Arc<RwLock<HashMap<PeerId, Arc<dyn RequestHandler>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer's serving side under its id.
    pub fn register(&self, peer: PeerId, handler: Arc<dyn RequestHandler>) {
        self.handlers.write().insert(peer, handler);
    }

    pub fn unregister(&self, peer: &PeerId) {
        self.handlers.write().remove(peer);
    }

    fn lookup(&self, peer: &PeerId) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.read().get(peer).cloned()
    }
}

/// In-memory transport for tests and demos.
///
/// `failure_rate` drops that fraction of requests as connection losses,
/// using a small deterministic LCG so failure sequences are reproducible.
pub struct MemoryTransport {
    network: MemoryNetwork,
    failure_rate: f64,
    rng_state: AtomicU64,
}

impl MemoryTransport {
    pub fn new(network: MemoryNetwork) -> Self {
        MemoryTransport {
            network,
            failure_rate: 0.0,
            rng_state: AtomicU64::new(0x5DEECE66D),
        }
    }

    /// A transport that fails the given fraction of requests.
    pub fn lossy(network: MemoryNetwork, failure_rate: f64, seed: u64) -> Self {
        MemoryTransport {
            network,
            failure_rate,
            rng_state: AtomicU64::new(seed),
        }
    }

    // LCG step; races between concurrent sessions are harmless here.
    fn next_random(&self) -> f64 {
        let next = self
            .rng_state
            .load(Ordering::Relaxed)
            .wrapping_mul(1103515245)
            .wrapping_add(12345);
        self.rng_state.store(next, Ordering::Relaxed);
        ((next >> 16) & 0x7fff) as f64 / 32768.0
    }
}

#[async_trait]
impl SyncTransport for MemoryTransport {
    async fn request(
        &self,
        peer: &PeerId,
        request: SyncRequest,
    ) -> Result<SyncResponse, TransportError> {
        if self.failure_rate > 0.0 && self.next_random() < self.failure_rate {
            return Err(TransportError::ConnectionLost(peer.clone()));
        }
        let handler = self
            .network
            .lookup(peer)
            .ok_or_else(|| TransportError::PeerNotFound(peer.clone()))?;
        Ok(handler.handle(request))
    }
}
