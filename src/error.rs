// Domain error taxonomy
//
// Every variant is per-event-scoped: recovered with a re-prompt or an
// informational reply, never by terminating the process. Storage
// failures map to a generic retry-later reply and are logged for
// operators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewardError {
    /// Proof identifier does not match the required phone format.
    #[error("invalid proof format: {0}")]
    InvalidProof(String),

    /// Destination does not normalize to a 16-digit card number.
    #[error("invalid destination format: {0}")]
    InvalidDestination(String),

    /// Proof identifier already used or already pending somewhere.
    #[error("proof already submitted: {0}")]
    DuplicateProof(String),

    /// Withdrawal requested with a zero balance.
    #[error("insufficient balance for participant {0}")]
    InsufficientBalance(i64),

    /// A pending withdrawal request already exists for this participant.
    #[error("withdrawal already pending for participant {0}")]
    WithdrawalAlreadyPending(i64),

    /// Decision issued by a principal without administrator capability.
    #[error("decision from non-administrator {0}")]
    Unauthorized(i64),

    /// Menu action from a participant who never completed /start.
    #[error("participant {0} is not registered")]
    NotRegistered(i64),

    /// Transient persistence failure. Surfaced as a retry-later reply.
    #[error("store unavailable: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for RewardError {
    fn from(e: rusqlite::Error) -> Self {
        RewardError::Store(anyhow::Error::new(e))
    }
}

pub type Result<T> = std::result::Result<T, RewardError>;
