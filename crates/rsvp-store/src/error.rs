use std::io;
use std::path::PathBuf;

use rsvp_types::EventId;

/// Errors from reservation store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The per-event lock could not be acquired before the deadline.
    #[error("timed out waiting for the lock on {event}")]
    LockTimeout { event: EventId },

    /// The backend cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store hit a state it cannot leave without a restart: a poisoned
    /// lock, or a journal tail that could not be rolled back.
    #[error("store poisoned: {0}")]
    Poisoned(String),

    /// Another store instance, in this or another process, owns the journal.
    #[error("journal {} is already open elsewhere", .path.display())]
    JournalLocked { path: PathBuf },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A journal record could not be decoded into valid rows.
    #[error("corrupt journal record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Returns `true` if repeating the same unit of work may succeed.
    ///
    /// Lock timeouts and unavailable backends are transient. I/O errors
    /// count only for the interrupt and timeout kinds.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LockTimeout { .. } | Self::Unavailable(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            Self::Poisoned(_)
            | Self::JournalLocked { .. }
            | Self::Serialization(_)
            | Self::CorruptRecord { .. } => false,
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Poisoned(format!("{what} lock poisoned"))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
