use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rsvp_store::{ReservationStore, StoreError};
use rsvp_types::{Capacity, EventId, Reservation, SeatCount, UserId};

use crate::config::LedgerConfig;
use crate::error::{AttemptError, LedgerError};
use crate::registry::EventRegistry;
use crate::retry::with_retry;

/// A write request, for callers that route operations generically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Reserve { event: EventId, user: UserId, seats: u32 },
    Amend { event: EventId, user: UserId, seats: u32 },
    Release { event: EventId, user: UserId },
    ReleaseEvent { event: EventId },
}

/// Successful result of an [`Operation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Reserved(Reservation),
    Amended(Amendment),
    /// The removed row, or `None` if there was nothing to release.
    Released(Option<Reservation>),
    /// Number of rows dropped for the event.
    EventReleased(usize),
}

/// A reservation before and after an amendment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub previous: Reservation,
    pub current: Reservation,
}

/// The capacity-enforcing reservation ledger.
///
/// Every write runs as one unit of work on the target event's store lock:
/// the row lookup, the capacity check and the write happen with no other
/// writer on that event in between. Capacity is looked up before the lock
/// is taken.
///
/// The ledger is `Send + Sync`; share it behind an `Arc`.
pub struct ReservationLedger {
    store: Arc<dyn ReservationStore>,
    registry: Arc<dyn EventRegistry>,
    config: LedgerConfig,
}

impl ReservationLedger {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        registry: Arc<dyn EventRegistry>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// The current configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Run `op`, waiting for locks and retries no later than `deadline`.
    ///
    /// Without a deadline each attempt waits up to
    /// [`LedgerConfig::lock_timeout`] for the event lock.
    pub fn apply(&self, op: Operation, deadline: Option<Instant>) -> Result<Outcome, LedgerError> {
        match op {
            Operation::Reserve { event, user, seats } => self
                .reserve_inner(event, user, seats, deadline)
                .map(Outcome::Reserved),
            Operation::Amend { event, user, seats } => self
                .amend_inner(event, user, seats, deadline)
                .map(Outcome::Amended),
            Operation::Release { event, user } => self
                .release_inner(event, user, deadline)
                .map(Outcome::Released),
            Operation::ReleaseEvent { event } => self
                .release_event_inner(event, deadline)
                .map(Outcome::EventReleased),
        }
    }

    /// Reserve `seats` for `user` on `event`.
    ///
    /// Fails with `AlreadyReserved` if the user already holds a row, and with
    /// `CapacityExceeded` if the event's total would pass its capacity.
    pub fn reserve(&self, event: EventId, user: UserId, seats: u32) -> Result<Reservation, LedgerError> {
        self.reserve_inner(event, user, seats, None)
    }

    /// Replace the user's seat count on `event` with `seats`.
    ///
    /// The capacity check counts the new value in place of the old one.
    pub fn amend(&self, event: EventId, user: UserId, seats: u32) -> Result<Amendment, LedgerError> {
        self.amend_inner(event, user, seats, None)
    }

    /// Drop the user's reservation on `event`. Releasing nothing succeeds.
    pub fn release(&self, event: EventId, user: UserId) -> Result<Option<Reservation>, LedgerError> {
        self.release_inner(event, user, None)
    }

    /// Drop every reservation on `event`, for when the event itself is deleted.
    pub fn release_event(&self, event: EventId) -> Result<usize, LedgerError> {
        self.release_event_inner(event, None)
    }

    /// Committed total of seats reserved on `event`. Never waits on writers.
    pub fn total_reserved(&self, event: EventId) -> Result<u64, LedgerError> {
        self.store.snapshot_total(event).map_err(store_error)
    }

    /// Seats still available on `event`.
    pub fn remaining(&self, event: EventId) -> Result<u64, LedgerError> {
        let capacity = self.capacity(event).map_err(|e| e.finish(1))?;
        Ok(capacity.remaining(self.total_reserved(event)?))
    }

    /// The user's committed reservation on `event`, if any.
    pub fn reservation(&self, event: EventId, user: UserId) -> Result<Option<Reservation>, LedgerError> {
        let seats = self.store.snapshot_get(event, user).map_err(store_error)?;
        Ok(seats.map(|seats| Reservation::new(event, user, seats)))
    }

    /// Guest list of `event`, sorted by user.
    pub fn guests(&self, event: EventId) -> Result<Vec<Reservation>, LedgerError> {
        self.store.reservations_for_event(event).map_err(store_error)
    }

    /// Every reservation `user` holds, sorted by event.
    pub fn reservations_for_user(&self, user: UserId) -> Result<Vec<Reservation>, LedgerError> {
        self.store.reservations_for_user(user).map_err(store_error)
    }

    fn reserve_inner(
        &self,
        event: EventId,
        user: UserId,
        seats: u32,
        deadline: Option<Instant>,
    ) -> Result<Reservation, LedgerError> {
        let seats = SeatCount::new(seats).map_err(|_| LedgerError::InvalidSeatCount(seats))?;

        with_retry(&self.config.retry, deadline, "reserve", |_| {
            let capacity = self.capacity(event)?;
            let mut unit = self.store.begin(event, self.attempt_deadline(deadline))?;

            if unit.get(user)?.is_some() {
                return Err(LedgerError::AlreadyReserved { event, user }.into());
            }

            let reserved = unit.sum_reserved()?;
            if !capacity.admits(reserved + u64::from(seats.get())) {
                debug!(%event, %user, %capacity, reserved, requested = seats.get(), "reserve rejected: capacity");
                return Err(LedgerError::CapacityExceeded {
                    event,
                    capacity: capacity.get(),
                    reserved,
                    requested: seats.get(),
                }
                .into());
            }

            unit.put(user, seats)?;
            unit.commit()?;
            debug!(%event, %user, seats = seats.get(), "reserved");
            Ok(Reservation::new(event, user, seats))
        })
    }

    fn amend_inner(
        &self,
        event: EventId,
        user: UserId,
        seats: u32,
        deadline: Option<Instant>,
    ) -> Result<Amendment, LedgerError> {
        let seats = SeatCount::new(seats).map_err(|_| LedgerError::InvalidSeatCount(seats))?;

        with_retry(&self.config.retry, deadline, "amend", |_| {
            let capacity = self.capacity(event)?;
            let mut unit = self.store.begin(event, self.attempt_deadline(deadline))?;

            let existing = unit
                .get(user)?
                .ok_or(LedgerError::NotFound { event, user })?;

            let current = unit.sum_reserved()?;
            let others = current - u64::from(existing.get());
            let projected = others + u64::from(seats.get());
            // Shrinking never raises the total, so it is allowed even when a
            // lowered capacity already sits below the current total.
            if seats > existing && !capacity.admits(projected) {
                debug!(%event, %user, %capacity, others, requested = seats.get(), "amend rejected: capacity");
                return Err(LedgerError::CapacityExceeded {
                    event,
                    capacity: capacity.get(),
                    reserved: others,
                    requested: seats.get(),
                }
                .into());
            }

            unit.put(user, seats)?;
            unit.commit()?;
            debug!(%event, %user, from = existing.get(), to = seats.get(), "amended");
            Ok(Amendment {
                previous: Reservation::new(event, user, existing),
                current: Reservation::new(event, user, seats),
            })
        })
    }

    fn release_inner(
        &self,
        event: EventId,
        user: UserId,
        deadline: Option<Instant>,
    ) -> Result<Option<Reservation>, LedgerError> {
        with_retry(&self.config.retry, deadline, "release", |_| {
            let mut unit = self.store.begin(event, self.attempt_deadline(deadline))?;
            let Some(existing) = unit.get(user)? else {
                return Ok(None);
            };

            unit.delete(user)?;
            unit.commit()?;
            debug!(%event, %user, seats = existing.get(), "released");
            Ok(Some(Reservation::new(event, user, existing)))
        })
    }

    fn release_event_inner(&self, event: EventId, deadline: Option<Instant>) -> Result<usize, LedgerError> {
        with_retry(&self.config.retry, deadline, "release_event", |_| {
            let mut unit = self.store.begin(event, self.attempt_deadline(deadline))?;
            let rows = unit.reservations()?;
            for row in &rows {
                unit.delete(row.user)?;
            }
            unit.commit()?;
            debug!(%event, rows = rows.len(), "released all reservations");
            Ok(rows.len())
        })
    }

    fn capacity(&self, event: EventId) -> Result<Capacity, AttemptError> {
        self.registry
            .capacity_of(event)?
            .ok_or(AttemptError::Rejected(LedgerError::EventNotFound(event)))
    }

    fn attempt_deadline(&self, deadline: Option<Instant>) -> Instant {
        deadline.unwrap_or_else(|| Instant::now() + self.config.lock_timeout())
    }
}

impl std::fmt::Debug for ReservationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn store_error(e: StoreError) -> LedgerError {
    AttemptError::Store(e).finish(1)
}
