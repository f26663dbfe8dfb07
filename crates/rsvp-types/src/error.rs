use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier {input:?}: {reason}")]
    InvalidId { input: String, reason: String },

    #[error("seat count must be at least 1")]
    ZeroSeats,

    #[error("capacity must be at least 1")]
    ZeroCapacity,
}
