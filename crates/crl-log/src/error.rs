//! Acceptance pipeline errors.

use crl_core::{ClockError, EncodingError, MessageId};
use crl_signer::{SignerError, VerificationError};
use thiserror::Error;

/// Why a message was not appended.
///
/// Only [`AppendError::MissingParents`] is recoverable — the caller fetches
/// the named parents and retries. Everything else is a permanent rejection
/// (or, for local submissions, a caller bug), and the message leaves no
/// trace in the store.
#[derive(Error, Debug, Clone)]
pub enum AppendError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("duplicate parent: {}", .0.short())]
    DuplicateParent(MessageId),

    #[error("parents are not in canonical order")]
    NonCanonicalParents,

    #[error("missing parents: {0:?}")]
    MissingParents(Vec<MessageId>),

    #[error("message claims clock {claimed} but its parents require {expected}")]
    ClockMismatch { claimed: u64, expected: u64 },

    #[error("no signer registered for this topic")]
    NoSigner,
}

impl From<ClockError> for AppendError {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::DuplicateParent(id) => AppendError::DuplicateParent(id),
            ClockError::MissingParents(ids) => AppendError::MissingParents(ids),
        }
    }
}

impl AppendError {
    /// True when the failure can be resolved by fetching dependencies and
    /// retrying; false for permanent rejections.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppendError::MissingParents(_))
    }
}
