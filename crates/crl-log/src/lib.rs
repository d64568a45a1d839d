//! # crl-log
//!
//! The append-only causal log for one topic: durable message storage keyed
//! by content address, the parent/children indexes, the head set, and the
//! acceptance pipeline that gates what enters — signature, authorization,
//! canonical parent order, clock rule — before anything is committed.
//!
//! The log also owns the topic's Merkle search tree and keeps its leaves in
//! lockstep with the message table, so the sync layer can serve and compare
//! tree state without a second bookkeeping path.

mod error;
mod log;
mod store;

pub use error::AppendError;
pub use log::{AppendListener, CausalLog, LogStats};
pub use store::{partition_known, LogStore, MemoryLogStore};
