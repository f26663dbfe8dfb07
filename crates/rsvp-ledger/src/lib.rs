//! Capacity-constrained reservation ledger.
//!
//! This crate enforces one rule: the seats reserved for an event never
//! exceed the event's capacity, no matter how many callers reserve, amend or
//! release at once. It provides:
//! - [`ReservationLedger`], the reserve / amend / release entry points
//! - The [`EventRegistry`] boundary for capacity lookups, with an in-memory
//!   implementation
//! - [`RetryPolicy`] for bounded backoff on transient store failures
//! - [`LedgerError`], whose variants callers map to user-facing outcomes
//!
//! Storage and per-event atomicity come from `rsvp-store`.

pub mod config;
pub mod error;
pub mod ledger;
pub mod registry;
pub mod retry;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::{Amendment, Operation, Outcome, ReservationLedger};
pub use registry::{EventRegistry, InMemoryEventRegistry, RegistryError};
pub use retry::RetryPolicy;
