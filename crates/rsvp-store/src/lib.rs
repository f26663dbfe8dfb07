//! Reservation storage for the reservation ledger.
//!
//! The store owns every `(event, user) → seats` row. Its one concurrency
//! primitive is the per-event [`UnitOfWork`]: an exclusive, deadline-bounded
//! scope in which the ledger reads the event's total, checks capacity and
//! stages writes, then commits them all at once.
//!
//! # Storage Backends
//!
//! All backends implement the [`ReservationStore`] trait:
//!
//! - [`InMemoryReservationStore`] -- map-based store for tests and embedding
//! - [`JournalReservationStore`] -- in-memory state rebuilt from an
//!   append-only, CRC-framed journal file
//!
//! # Design Rules
//!
//! 1. One row per `(event, user)`; a put replaces, never appends.
//! 2. Units of work on the same event are serialized; different events never
//!    contend.
//! 3. Staged writes are invisible outside their unit until commit.
//! 4. Snapshot reads never wait on a unit of work.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod journal;
mod lock;
pub mod memory;
mod table;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use journal::{JournalConfig, JournalRecord, JournalReservationStore, SyncMode};
pub use memory::InMemoryReservationStore;
pub use table::Change;
pub use traits::{ReservationStore, UnitOfWork};
