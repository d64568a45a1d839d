//! The sync session manager.
//!
//! One manager per topic drives bounded, retrying anti-entropy sessions
//! against remote peers. A session walks the peer's tree from the root,
//! collects the message ids we lack, pulls their envelope bytes and feeds
//! them through the normal acceptance pipeline. Per peer the session moves
//! through `Idle → Requesting → Diffing → Fetching → Applying → Cooldown`,
//! or into `Backoff` on failure; `Cooldown` and `Backoff` expire by
//! timestamp, after which the peer is admissible again.

use crate::error::SyncError;
use crate::server::SharedLog;
use crate::transport::SyncTransport;
use crate::wire::{PeerId, SyncRequest, SyncResponse};
use crl_core::{decode_signed, MessageId, Payload, SignedMessage};
use crl_log::{AppendError, LogStore, MemoryLogStore};
use crl_mst::{Node, TREE_PROTOCOL_VERSION};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Session state for one peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Diffing,
    Fetching,
    Applying,
    /// Successful session finished recently; new attempts wait out the quiet
    /// period.
    Cooldown,
    /// Last attempt failed; new attempts wait out the backoff delay.
    Backoff,
    /// Too many consecutive failures. Stays failed until
    /// [`SyncManager::reset_peer`].
    Failed,
}

/// Sync behavior knobs.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Sessions admitted at once across all peers of the topic.
    pub max_concurrent_sessions: usize,
    /// Ids per `GetValues` request.
    pub batch_size: usize,
    /// Quiet period after a successful session with a peer.
    pub cooldown: Duration,
    /// First-failure backoff; doubles per consecutive failure.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failures before the peer session is marked failed.
    pub max_consecutive_failures: u32,
    /// Deadline for the root exchange.
    pub request_timeout: Duration,
    /// Deadline for the whole tree walk.
    pub diff_timeout: Duration,
    /// Deadline for all value fetches.
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_concurrent_sessions: 8,
            batch_size: 64,
            cooldown: Duration::from_secs(30),
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_consecutive_failures: 5,
            request_timeout: Duration::from_secs(10),
            diff_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Builder for [`SyncConfig`].
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        SyncConfigBuilder {
            config: SyncConfig::default(),
        }
    }

    pub fn max_concurrent_sessions(mut self, n: usize) -> Self {
        self.config.max_concurrent_sessions = n.max(1);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn cooldown(mut self, d: Duration) -> Self {
        self.config.cooldown = d;
        self
    }

    pub fn base_backoff(mut self, d: Duration) -> Self {
        self.config.base_backoff = d;
        self
    }

    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.config.max_backoff = d;
        self
    }

    pub fn max_consecutive_failures(mut self, n: u32) -> Self {
        self.config.max_consecutive_failures = n.max(1);
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.config.request_timeout = d;
        self
    }

    pub fn diff_timeout(mut self, d: Duration) -> Self {
        self.config.diff_timeout = d;
        self
    }

    pub fn fetch_timeout(mut self, d: Duration) -> Self {
        self.config.fetch_timeout = d;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Events emitted by the manager.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    Started(PeerId),
    /// Roots matched; nothing exchanged.
    NoDivergence(PeerId),
    Completed {
        peer: PeerId,
        fetched: usize,
        applied: usize,
    },
    Failed {
        peer: PeerId,
        reason: String,
    },
    /// Consecutive-failure cap reached; the transport collaborator should
    /// consider disconnecting this peer.
    PeerFailed(PeerId),
}

/// What a `sync_with` call amounted to.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Roots matched in one round trip.
    NoDivergence,
    Completed {
        fetched: usize,
        applied: usize,
        /// Envelopes permanently rejected by acceptance (bad signature or
        /// unauthorized signer relayed by the peer).
        rejected: usize,
    },
    /// This peer already has an active session; the request was ignored.
    AlreadyActive,
    /// Inside the post-success quiet period.
    CoolingDown,
    /// Inside the post-failure backoff delay.
    BackingOff,
    /// The attempt failed; the peer enters backoff.
    Failed(SyncError),
    /// Consecutive-failure cap reached now or previously.
    PeerFailed(SyncError),
}

#[derive(Debug, Default)]
struct PeerEntry {
    state: Option<SessionState>,
    failures: u32,
    /// Gate instant for Cooldown/Backoff states.
    not_before: Option<Instant>,
}

impl PeerEntry {
    fn state(&self) -> SessionState {
        self.state.unwrap_or(SessionState::Idle)
    }
}

struct SessionReport {
    fetched: usize,
    applied: usize,
    rejected: usize,
    divergent: bool,
}

/// Bounded, retrying anti-entropy session manager for one topic.
pub struct SyncManager<P, S = MemoryLogStore<P>, T = crate::transport::MemoryTransport>
where
    P: Payload,
    S: LogStore<P>,
    T: SyncTransport,
{
    log: SharedLog<P, S>,
    transport: Arc<T>,
    config: SyncConfig,
    peers: Mutex<HashMap<PeerId, PeerEntry>>,
    admission: Arc<Semaphore>,
    events: broadcast::Sender<SyncEvent>,
    shutdown: AtomicBool,
}

impl<P, S, T> SyncManager<P, S, T>
where
    P: Payload,
    S: LogStore<P>,
    T: SyncTransport,
{
    pub fn new(log: SharedLog<P, S>, transport: Arc<T>) -> Self {
        Self::with_config(log, transport, SyncConfig::default())
    }

    pub fn with_config(log: SharedLog<P, S>, transport: Arc<T>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let admission = Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1)));
        SyncManager {
            log,
            transport,
            config,
            peers: Mutex::new(HashMap::new()),
            admission,
            events,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Current session state for a peer (`Idle` if never seen).
    pub fn session_state(&self, peer: &PeerId) -> SessionState {
        self.peers
            .lock()
            .get(peer)
            .map(|e| e.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Clear a failed peer so it may sync again, e.g. after the transport
    /// reconnected it.
    pub fn reset_peer(&self, peer: &PeerId) {
        self.peers.lock().remove(peer);
    }

    /// Cancel in-flight sessions at their next state boundary and refuse new
    /// ones. Partial diff progress is discarded; only messages that fully
    /// applied are retained.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.admission.close();
    }

    /// Run one sync session against a peer, respecting admission rules.
    ///
    /// Additional callers queue FIFO on the session semaphore; a call for a
    /// peer that is already mid-session returns
    /// [`SyncOutcome::AlreadyActive`] without queueing.
    pub async fn sync_with(&self, peer: &PeerId) -> SyncOutcome {
        if self.shutdown.load(Ordering::SeqCst) {
            return SyncOutcome::Failed(SyncError::Cancelled);
        }

        // Admission gate; holds the peer-table lock only, never across await.
        {
            let mut peers = self.peers.lock();
            let entry = peers.entry(peer.clone()).or_default();
            match entry.state() {
                SessionState::Requesting
                | SessionState::Diffing
                | SessionState::Fetching
                | SessionState::Applying => return SyncOutcome::AlreadyActive,
                SessionState::Failed => {
                    return SyncOutcome::PeerFailed(SyncError::Protocol(
                        "peer marked failed after repeated errors".into(),
                    ))
                }
                SessionState::Cooldown => {
                    if entry.not_before.is_some_and(|gate| Instant::now() < gate) {
                        return SyncOutcome::CoolingDown;
                    }
                }
                SessionState::Backoff => {
                    if entry.not_before.is_some_and(|gate| Instant::now() < gate) {
                        return SyncOutcome::BackingOff;
                    }
                }
                SessionState::Idle => {}
            }
            entry.state = Some(SessionState::Requesting);
            entry.not_before = None;
        }

        let permit = match self.admission.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.set_state(peer, SessionState::Idle);
                return SyncOutcome::Failed(SyncError::Cancelled);
            }
        };

        let result = self.run_session(peer).await;
        drop(permit);

        match result {
            Ok(report) => {
                {
                    let mut peers = self.peers.lock();
                    let entry = peers.entry(peer.clone()).or_default();
                    entry.state = Some(SessionState::Cooldown);
                    entry.failures = 0;
                    entry.not_before = Some(Instant::now() + self.config.cooldown);
                }
                if report.divergent {
                    let _ = self.events.send(SyncEvent::Completed {
                        peer: peer.clone(),
                        fetched: report.fetched,
                        applied: report.applied,
                    });
                    SyncOutcome::Completed {
                        fetched: report.fetched,
                        applied: report.applied,
                        rejected: report.rejected,
                    }
                } else {
                    let _ = self.events.send(SyncEvent::NoDivergence(peer.clone()));
                    SyncOutcome::NoDivergence
                }
            }
            Err(err) => {
                warn!(peer = %peer, error = %err, "sync session failed");
                let failed_out = {
                    let mut peers = self.peers.lock();
                    let entry = peers.entry(peer.clone()).or_default();
                    entry.failures += 1;
                    if entry.failures >= self.config.max_consecutive_failures {
                        entry.state = Some(SessionState::Failed);
                        entry.not_before = None;
                        true
                    } else {
                        entry.state = Some(SessionState::Backoff);
                        entry.not_before =
                            Some(Instant::now() + self.backoff_delay(entry.failures));
                        false
                    }
                };
                let _ = self.events.send(SyncEvent::Failed {
                    peer: peer.clone(),
                    reason: err.to_string(),
                });
                if failed_out {
                    let _ = self.events.send(SyncEvent::PeerFailed(peer.clone()));
                    SyncOutcome::PeerFailed(err)
                } else {
                    SyncOutcome::Failed(err)
                }
            }
        }
    }

    /// Sync against several peers concurrently. Admission still applies: at
    /// most `max_concurrent_sessions` run at once, the rest queue FIFO.
    pub async fn sync_all(&self, peers: &[PeerId]) -> Vec<(PeerId, SyncOutcome)> {
        let sessions = peers
            .iter()
            .map(|peer| async move { (peer.clone(), self.sync_with(peer).await) });
        futures::future::join_all(sessions).await
    }

    fn set_state(&self, peer: &PeerId, state: SessionState) {
        let mut peers = self.peers.lock();
        peers.entry(peer.clone()).or_default().state = Some(state);
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.shutdown.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn backoff_delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let base = self.config.base_backoff.as_millis().max(1) as u64;
        let capped = base
            .saturating_mul(1 << exp)
            .min(self.config.max_backoff.as_millis() as u64);
        // Randomized so a burst of failing peers does not retry in lockstep.
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_millis(((capped as f64) * jitter) as u64)
    }

    async fn run_session(&self, peer: &PeerId) -> Result<SessionReport, SyncError> {
        let _ = self.events.send(SyncEvent::Started(peer.clone()));

        // Requesting: exchange roots.
        let response = timeout(
            self.config.request_timeout,
            self.transport.request(peer, SyncRequest::GetRoot),
        )
        .await
        .map_err(|_| SyncError::Timeout("requesting"))??;
        let (version, remote_root) = match response {
            SyncResponse::Root { version, node } => (version, node),
            SyncResponse::Error { reason } => return Err(SyncError::Protocol(reason)),
            other => {
                return Err(SyncError::Protocol(format!(
                    "expected root response, got {:?}",
                    other
                )))
            }
        };
        if version != TREE_PROTOCOL_VERSION {
            return Err(SyncError::Protocol(format!(
                "tree protocol version mismatch: ours {}, peer {}",
                TREE_PROTOCOL_VERSION, version
            )));
        }

        let local_root = self.log.read().root();
        if local_root.hash == remote_root.hash {
            debug!(peer = %peer, "roots match, no divergence");
            return Ok(SessionReport {
                fetched: 0,
                applied: 0,
                rejected: 0,
                divergent: false,
            });
        }

        // Diffing: walk mismatching nodes down to divergent leaf keys.
        self.set_state(peer, SessionState::Diffing);
        let divergent = timeout(self.config.diff_timeout, self.diff(peer, remote_root))
            .await
            .map_err(|_| SyncError::Timeout("diffing"))??;
        debug!(peer = %peer, divergent = divergent.len(), "tree diff complete");

        // Fetching: pull envelope bytes for keys we lack.
        self.set_state(peer, SessionState::Fetching);
        let envelopes = timeout(self.config.fetch_timeout, self.fetch(peer, &divergent))
            .await
            .map_err(|_| SyncError::Timeout("fetching"))??;
        let fetched = envelopes.len();

        // Applying: normal acceptance, with parent-blocked envelopes queued
        // and retried as their parents land.
        self.set_state(peer, SessionState::Applying);
        self.check_cancelled()?;
        let (applied, rejected) = self.apply(envelopes)?;

        Ok(SessionReport {
            fetched,
            applied,
            rejected,
            divergent: true,
        })
    }

    /// Worklist walk of the remote tree. A node whose hash matches the local
    /// node at the same position closes that whole subtree; a mismatching
    /// internal node is expanded via `GetChildren`; mismatching leaves are
    /// the divergent candidates.
    async fn diff(&self, peer: &PeerId, remote_root: Node) -> Result<Vec<MessageId>, SyncError> {
        let mut work: Vec<Node> = vec![remote_root];
        let mut divergent: BTreeSet<MessageId> = BTreeSet::new();

        while let Some(node) = work.pop() {
            self.check_cancelled()?;

            if node.level == 0 {
                if let Some(id) = node.key {
                    if !self.log.read().has_message(&id) {
                        divergent.insert(id);
                    }
                }
                continue;
            }

            if self.log.read().node_hash(node.level, node.key) == Some(node.hash) {
                continue;
            }

            let response = self
                .transport
                .request(
                    peer,
                    SyncRequest::GetChildren {
                        level: node.level,
                        key: node.key,
                    },
                )
                .await?;
            let children = match response {
                SyncResponse::Children { nodes } => nodes,
                SyncResponse::Error { reason } => return Err(SyncError::Protocol(reason)),
                other => {
                    return Err(SyncError::Protocol(format!(
                        "expected children response, got {:?}",
                        other
                    )))
                }
            };
            for child in children {
                if child.level + 1 != node.level {
                    return Err(SyncError::Protocol(format!(
                        "child level {} under node level {}",
                        child.level, node.level
                    )));
                }
                work.push(child);
            }
        }

        Ok(divergent.into_iter().collect())
    }

    async fn fetch(
        &self,
        peer: &PeerId,
        divergent: &[MessageId],
    ) -> Result<Vec<SignedMessage<P>>, SyncError> {
        let mut envelopes = Vec::with_capacity(divergent.len());
        for chunk in divergent.chunks(self.config.batch_size.max(1)) {
            self.check_cancelled()?;
            let response = self
                .transport
                .request(
                    peer,
                    SyncRequest::GetValues {
                        keys: chunk.to_vec(),
                    },
                )
                .await?;
            let messages = match response {
                SyncResponse::Values { messages } => messages,
                SyncResponse::Error { reason } => return Err(SyncError::Protocol(reason)),
                other => {
                    return Err(SyncError::Protocol(format!(
                        "expected values response, got {:?}",
                        other
                    )))
                }
            };
            for bytes in messages {
                let signed = decode_signed::<P>(&bytes)
                    .map_err(|err| SyncError::Protocol(format!("undecodable envelope: {}", err)))?;
                envelopes.push(signed);
            }
        }
        Ok(envelopes)
    }

    /// Apply fetched envelopes through acceptance. Parent-blocked envelopes
    /// go to the back of the queue; if a full pass over the queue makes no
    /// progress, the peer advertised leaves without their ancestry.
    fn apply(&self, envelopes: Vec<SignedMessage<P>>) -> Result<(usize, usize), SyncError> {
        let mut pending: VecDeque<SignedMessage<P>> = envelopes.into();
        let mut applied = 0usize;
        let mut rejected = 0usize;
        let mut stalled = 0usize;

        while let Some(signed) = pending.pop_front() {
            match self.log.write().append(signed.clone()) {
                Ok(_) => {
                    applied += 1;
                    stalled = 0;
                }
                Err(AppendError::MissingParents(_)) => {
                    stalled += 1;
                    if stalled > pending.len() {
                        return Err(SyncError::Protocol(
                            "peer served leaves without their ancestry".into(),
                        ));
                    }
                    pending.push_back(signed);
                }
                Err(err) => {
                    // Permanent rejection of a relayed message: drop it and
                    // keep the session alive for the rest of the batch.
                    warn!(error = %err, "rejected fetched message");
                    rejected += 1;
                    stalled = 0;
                }
            }
        }

        Ok((applied, rejected))
    }
}
