//! Serving side of a sync session: answers the three request types from the
//! local log.

use crate::wire::{SyncRequest, SyncResponse};
use crl_log::{CausalLog, LogStore, MemoryLogStore};
use crl_core::Payload;
use crl_mst::TREE_PROTOCOL_VERSION;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to one topic's log: single writer, snapshot readers.
pub type SharedLog<P, S = MemoryLogStore<P>> = Arc<RwLock<CausalLog<P, S>>>;

/// Handler contract the in-memory transport dispatches to. One per
/// registered peer; a real transport would frame requests over its streams
/// and call the same entry point.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: SyncRequest) -> SyncResponse;
}

/// Answers sync requests from the local log's tree and message table.
///
/// Reads take the log's read lock per request — each answer is a consistent
/// point-in-time snapshot, and serving never blocks local appends for longer
/// than one tree lookup.
pub struct SyncServer<P: Payload, S: LogStore<P> = MemoryLogStore<P>> {
    log: SharedLog<P, S>,
}

impl<P: Payload, S: LogStore<P>> SyncServer<P, S> {
    pub fn new(log: SharedLog<P, S>) -> Self {
        SyncServer { log }
    }
}

impl<P: Payload, S: LogStore<P>> RequestHandler for SyncServer<P, S> {
    fn handle(&self, request: SyncRequest) -> SyncResponse {
        match request {
            SyncRequest::GetRoot => SyncResponse::Root {
                version: TREE_PROTOCOL_VERSION,
                node: self.log.read().root(),
            },
            SyncRequest::GetChildren { level, key } => {
                match self.log.read().children(level, key) {
                    Ok(nodes) => SyncResponse::Children { nodes },
                    Err(err) => SyncResponse::Error {
                        reason: err.to_string(),
                    },
                }
            }
            SyncRequest::GetValues { keys } => SyncResponse::Values {
                messages: self.log.read().get_values(&keys),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crl_core::Topic;
    use crl_signer::{Ed25519Signer, Signer, SignerCache, TopicAuthority};

    fn shared_log() -> SharedLog<Vec<u8>> {
        let topic = Topic::new("server");
        let cache =
            SignerCache::with_signers(vec![Arc::new(Ed25519Signer::generate()) as Arc<dyn Signer>]);
        Arc::new(RwLock::new(CausalLog::new(
            topic.clone(),
            cache,
            TopicAuthority::open(topic),
        )))
    }

    #[test]
    fn root_response_carries_the_protocol_version() {
        let log = shared_log();
        let server = SyncServer::new(log.clone());

        match server.handle(SyncRequest::GetRoot) {
            SyncResponse::Root { version, node } => {
                assert_eq!(version, TREE_PROTOCOL_VERSION);
                assert_eq!(node, log.read().root());
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn values_skip_unknown_ids() {
        let log = shared_log();
        let signed = log.write().create(b"only".to_vec()).unwrap();
        let id = signed.derive_id().unwrap();
        let unknown = crl_core::MessageId(crl_core::Hash::digest(b"unknown"));

        let server = SyncServer::new(log);
        match server.handle(SyncRequest::GetValues {
            keys: vec![id, unknown],
        }) {
            SyncResponse::Values { messages } => assert_eq!(messages.len(), 1),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn unknown_node_yields_an_error_response() {
        let log = shared_log();
        let server = SyncServer::new(log);

        assert!(matches!(
            server.handle(SyncRequest::GetChildren {
                level: 9,
                key: None
            }),
            SyncResponse::Error { .. }
        ));
    }
}
