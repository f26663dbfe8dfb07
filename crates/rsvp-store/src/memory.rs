use std::time::Instant;

use rsvp_types::{EventId, Reservation, SeatCount, UserId};

use crate::error::StoreResult;
use crate::table::{Change, CommitSink, ReservationTable};
use crate::traits::{ReservationStore, UnitOfWork};

/// In-memory reservation store.
///
/// Intended for tests and embedding. Rows and running per-event totals live
/// behind a `RwLock`; per-event locks serialize units of work.
pub struct InMemoryReservationStore {
    table: ReservationTable,
}

struct ApplyOnly;

impl CommitSink for ApplyOnly {
    fn commit(&self, table: &ReservationTable, event: EventId, changes: &[Change]) -> StoreResult<()> {
        table.apply(event, changes)
    }
}

impl InMemoryReservationStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            table: ReservationTable::new(),
        }
    }

    /// Number of reservation rows currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        self.table.row_count()
    }

    /// Returns `true` if the store holds no rows.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryReservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn begin(&self, event: EventId, deadline: Instant) -> StoreResult<Box<dyn UnitOfWork + '_>> {
        let unit = self.table.begin(event, deadline, &ApplyOnly)?;
        Ok(Box::new(unit))
    }

    fn snapshot_total(&self, event: EventId) -> StoreResult<u64> {
        self.table.total(event)
    }

    fn snapshot_get(&self, event: EventId, user: UserId) -> StoreResult<Option<SeatCount>> {
        self.table.get(event, user)
    }

    fn reservations_for_event(&self, event: EventId) -> StoreResult<Vec<Reservation>> {
        self.table.for_event(event)
    }

    fn reservations_for_user(&self, user: UserId) -> StoreResult<Vec<Reservation>> {
        self.table.for_user(user)
    }
}

impl std::fmt::Debug for InMemoryReservationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows = self.table.row_count().unwrap_or(0);
        f.debug_struct("InMemoryReservationStore")
            .field("row_count", &rows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::time::Duration;

    fn soon() -> Instant {
        Instant::now() + Duration::from_millis(200)
    }

    fn seats(n: u32) -> SeatCount {
        SeatCount::new(n).unwrap()
    }

    const EVENT: EventId = EventId::new(1);
    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);

    #[test]
    fn commit_makes_writes_visible() {
        let store = InMemoryReservationStore::new();

        let mut unit = store.begin(EVENT, soon()).unwrap();
        unit.put(ALICE, seats(3)).unwrap();
        unit.put(BOB, seats(2)).unwrap();
        assert_eq!(unit.sum_reserved().unwrap(), 5);
        unit.commit().unwrap();

        assert_eq!(store.snapshot_total(EVENT).unwrap(), 5);
        assert_eq!(store.snapshot_get(EVENT, ALICE).unwrap(), Some(seats(3)));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn staged_writes_are_invisible_until_commit() {
        let store = InMemoryReservationStore::new();

        let mut unit = store.begin(EVENT, soon()).unwrap();
        unit.put(ALICE, seats(4)).unwrap();
        assert_eq!(unit.get(ALICE).unwrap(), Some(seats(4)));
        assert_eq!(store.snapshot_total(EVENT).unwrap(), 0);
        assert_eq!(store.snapshot_get(EVENT, ALICE).unwrap(), None);
        drop(unit);

        assert_eq!(store.snapshot_total(EVENT).unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn sum_reflects_staged_replace_and_delete() {
        let store = InMemoryReservationStore::new();
        let mut unit = store.begin(EVENT, soon()).unwrap();
        unit.put(ALICE, seats(3)).unwrap();
        unit.put(BOB, seats(3)).unwrap();
        unit.commit().unwrap();

        let mut unit = store.begin(EVENT, soon()).unwrap();
        unit.put(ALICE, seats(6)).unwrap();
        assert_eq!(unit.sum_reserved().unwrap(), 9);
        unit.delete(BOB).unwrap();
        assert_eq!(unit.sum_reserved().unwrap(), 6);
        assert_eq!(unit.reservations().unwrap().len(), 1);
        unit.commit().unwrap();

        assert_eq!(store.snapshot_total(EVENT).unwrap(), 6);
        assert_eq!(store.snapshot_get(EVENT, BOB).unwrap(), None);
    }

    #[test]
    fn delete_of_absent_row_is_noop() {
        let store = InMemoryReservationStore::new();
        let mut unit = store.begin(EVENT, soon()).unwrap();
        unit.delete(ALICE).unwrap();
        unit.commit().unwrap();
        assert_eq!(store.snapshot_total(EVENT).unwrap(), 0);
    }

    #[test]
    fn open_unit_blocks_same_event_only() {
        let store = InMemoryReservationStore::new();
        let _held = store.begin(EVENT, soon()).unwrap();

        let short = Instant::now() + Duration::from_millis(20);
        let err = store.begin(EVENT, short).err().unwrap();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
        assert!(err.is_transient());

        assert!(store.begin(EventId::new(2), short).is_ok());
    }

    #[test]
    fn reads_by_user_span_events() {
        let store = InMemoryReservationStore::new();
        for event in [EventId::new(3), EventId::new(1)] {
            let mut unit = store.begin(event, soon()).unwrap();
            unit.put(ALICE, seats(1)).unwrap();
            unit.commit().unwrap();
        }

        let rows = store.reservations_for_user(ALICE).unwrap();
        let events: Vec<_> = rows.iter().map(|r| r.event).collect();
        assert_eq!(events, vec![EventId::new(1), EventId::new(3)]);
        assert!(store.reservations_for_user(BOB).unwrap().is_empty());
    }
}
