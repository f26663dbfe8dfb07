use rsvp_store::StoreError;
use rsvp_types::{EventId, UserId};

use crate::registry::RegistryError;

/// Errors produced by ledger operations.
///
/// Only [`LedgerError::Transient`] is worth retrying; every other variant is
/// a decision the same request would get again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error(
        "the number of guests exceeds the event capacity of {capacity} guests \
         ({reserved} reserved, {requested} requested for {event})"
    )]
    CapacityExceeded {
        event: EventId,
        capacity: u32,
        reserved: u64,
        requested: u32,
    },

    #[error("{user} already holds a reservation for {event}")]
    AlreadyReserved { event: EventId, user: UserId },

    #[error("{user} holds no reservation for {event}")]
    NotFound { event: EventId, user: UserId },

    #[error("event not found: {0}")]
    EventNotFound(EventId),

    #[error("seat count must be at least 1, got {0}")]
    InvalidSeatCount(u32),

    #[error("transient failure after {attempts} attempt(s): {reason}")]
    Transient { attempts: u32, reason: String },

    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    /// Returns `true` if the caller may repeat the request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns `true` for capacity, precondition and validation rejections.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::AlreadyReserved { .. }
                | Self::NotFound { .. }
                | Self::EventNotFound(_)
                | Self::InvalidSeatCount(_)
        )
    }
}

/// Failure of a single attempt, before the retry loop decides what to do.
#[derive(Debug)]
pub(crate) enum AttemptError {
    Rejected(LedgerError),
    Registry(RegistryError),
    Store(StoreError),
}

impl From<RegistryError> for AttemptError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<StoreError> for AttemptError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<LedgerError> for AttemptError {
    fn from(e: LedgerError) -> Self {
        Self::Rejected(e)
    }
}

impl AttemptError {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Rejected(_) => false,
            Self::Registry(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
        }
    }

    /// Final error after `attempts` tries.
    pub(crate) fn finish(self, attempts: u32) -> LedgerError {
        match self {
            Self::Rejected(e) => e,
            Self::Registry(e) if e.is_transient() => LedgerError::Transient {
                attempts,
                reason: e.to_string(),
            },
            Self::Registry(e) => LedgerError::Store(e.to_string()),
            Self::Store(e) if e.is_transient() => LedgerError::Transient {
                attempts,
                reason: e.to_string(),
            },
            Self::Store(e) => LedgerError::Store(e.to_string()),
        }
    }
}
