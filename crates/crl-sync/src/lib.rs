//! # crl-sync
//!
//! Anti-entropy sync sessions for the Causeway replicated log.
//!
//! A session compares tree roots with a peer, walks mismatching nodes to the
//! divergent leaf keys, pulls the missing envelopes and feeds them through
//! the log's acceptance pipeline. Sessions are bounded (FIFO admission,
//! at-most-one per peer), deadline-guarded, and retried with randomized
//! backoff until a consecutive-failure cap marks the peer failed.
//!
//! The transport/discovery layer is a collaborator behind [`SyncTransport`];
//! the in-memory implementation here exists for tests and demos.

mod error;
mod manager;
mod server;
mod transport;
mod wire;

pub use error::{SyncError, TransportError};
pub use manager::{
    SessionState, SyncConfig, SyncConfigBuilder, SyncEvent, SyncManager, SyncOutcome,
};
pub use server::{RequestHandler, SharedLog, SyncServer};
pub use transport::{MemoryNetwork, MemoryTransport, SyncTransport};
pub use wire::{PeerId, SyncRequest, SyncResponse};
