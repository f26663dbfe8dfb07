use std::time::Instant;

use rsvp_types::{EventId, Reservation, SeatCount, UserId};

use crate::error::StoreResult;

/// Reservation storage with per-event atomic units of work.
///
/// All implementations must satisfy these invariants:
/// - At most one row per `(event, user)`.
/// - At most one unit of work per event is open at a time. Units of work on
///   different events never wait on each other.
/// - Writes made in a unit of work are invisible to every other reader until
///   the unit commits, and a commit applies all of them at once. Dropping a
///   unit without committing discards its writes.
/// - Snapshot reads never wait for a unit of work.
pub trait ReservationStore: Send + Sync {
    /// Open a unit of work on `event`, waiting for the event's lock until
    /// `deadline` at most.
    ///
    /// Returns [`StoreError::LockTimeout`](crate::StoreError::LockTimeout) if
    /// the lock is still held when the deadline passes.
    fn begin(&self, event: EventId, deadline: Instant) -> StoreResult<Box<dyn UnitOfWork + '_>>;

    /// Committed total of seats reserved for `event`; 0 if none.
    fn snapshot_total(&self, event: EventId) -> StoreResult<u64>;

    /// Committed seat count for `(event, user)`.
    fn snapshot_get(&self, event: EventId, user: UserId) -> StoreResult<Option<SeatCount>>;

    /// Committed reservations of `event`, sorted by user.
    fn reservations_for_event(&self, event: EventId) -> StoreResult<Vec<Reservation>>;

    /// Committed reservations held by `user`, sorted by event.
    fn reservations_for_user(&self, user: UserId) -> StoreResult<Vec<Reservation>>;
}

/// An open, exclusive unit of work on a single event.
///
/// Reads see the unit's own staged writes layered over committed state.
pub trait UnitOfWork {
    /// The event this unit is scoped to.
    fn event(&self) -> EventId;

    /// Total seats reserved for the event, including staged writes.
    fn sum_reserved(&self) -> StoreResult<u64>;

    /// Seat count for `user`, including staged writes.
    fn get(&self, user: UserId) -> StoreResult<Option<SeatCount>>;

    /// Stage an upsert of the user's row.
    fn put(&mut self, user: UserId, seats: SeatCount) -> StoreResult<()>;

    /// Stage removal of the user's row. No-op if absent.
    fn delete(&mut self, user: UserId) -> StoreResult<()>;

    /// All reservations of the event, including staged writes, sorted by user.
    fn reservations(&self) -> StoreResult<Vec<Reservation>>;

    /// Apply every staged write atomically and release the event lock.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}
