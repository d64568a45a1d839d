//! Sync-layer errors.

use crate::wire::PeerId;
use thiserror::Error;

/// Transport-level failures. Recoverable: they drive the backoff transition,
/// never a permanent rejection.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    #[error("connection to {0} lost")]
    ConnectionLost(PeerId),

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Why a sync session ended without converging.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Transport failure; retried after backoff.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer served malformed or inconsistent tree data. The session is
    /// aborted and the peer flagged, but not banned here.
    #[error("protocol violation from peer: {0}")]
    Protocol(String),

    /// A session state exceeded its deadline.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// The manager is shutting down or the session was cancelled at a state
    /// boundary.
    #[error("session cancelled")]
    Cancelled,
}
