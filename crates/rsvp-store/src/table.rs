//! Committed reservation state shared by every backend, and the staged unit
//! of work that runs against it.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rsvp_types::{EventId, Reservation, ReservationKey, SeatCount, UserId};

use crate::error::{StoreError, StoreResult};
use crate::lock::{EventLockGuard, EventLocks};
use crate::traits::UnitOfWork;

/// A single row write inside a unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Upsert the user's row to `seats`.
    Put { user: UserId, seats: SeatCount },
    /// Remove the user's row if present.
    Delete { user: UserId },
}

#[derive(Default)]
struct Committed {
    rows: BTreeMap<ReservationKey, SeatCount>,
    totals: HashMap<EventId, u64>,
}

impl Committed {
    fn apply(&mut self, event: EventId, change: Change) {
        let (user, new) = match change {
            Change::Put { user, seats } => (user, Some(seats)),
            Change::Delete { user } => (user, None),
        };
        let key = ReservationKey::new(event, user);
        let old = match new {
            Some(seats) => self.rows.insert(key, seats),
            None => self.rows.remove(&key),
        };

        let delta_out = old.map_or(0, |s| u64::from(s.get()));
        let delta_in = new.map_or(0, |s| u64::from(s.get()));
        let total = self.totals.entry(event).or_insert(0);
        *total = *total - delta_out + delta_in;
        if *total == 0 {
            self.totals.remove(&event);
        }
    }

    fn event_rows(&self, event: EventId) -> impl Iterator<Item = (UserId, SeatCount)> + '_ {
        let lo = ReservationKey::new(event, UserId::new(0));
        let hi = ReservationKey::new(event, UserId::new(u64::MAX));
        self.rows.range(lo..=hi).map(|(k, s)| (k.user, *s))
    }
}

/// Committed rows, running per-event totals, and the per-event lock table.
///
/// Readers take the `committed` read lock only; they never see staged writes
/// because those live in the unit of work until [`ReservationTable::apply`].
pub(crate) struct ReservationTable {
    committed: RwLock<Committed>,
    locks: EventLocks,
}

impl ReservationTable {
    pub(crate) fn new() -> Self {
        Self {
            committed: RwLock::new(Committed::default()),
            locks: EventLocks::new(),
        }
    }

    /// Apply one committed batch for `event` in a single write-lock scope.
    pub(crate) fn apply(&self, event: EventId, changes: &[Change]) -> StoreResult<()> {
        let mut committed = self
            .committed
            .write()
            .map_err(|_| StoreError::poisoned("table"))?;
        for change in changes {
            committed.apply(event, *change);
        }
        Ok(())
    }

    pub(crate) fn total(&self, event: EventId) -> StoreResult<u64> {
        let committed = self.read()?;
        Ok(committed.totals.get(&event).copied().unwrap_or(0))
    }

    pub(crate) fn get(&self, event: EventId, user: UserId) -> StoreResult<Option<SeatCount>> {
        let committed = self.read()?;
        Ok(committed.rows.get(&ReservationKey::new(event, user)).copied())
    }

    pub(crate) fn for_event(&self, event: EventId) -> StoreResult<Vec<Reservation>> {
        let committed = self.read()?;
        Ok(committed
            .event_rows(event)
            .map(|(user, seats)| Reservation::new(event, user, seats))
            .collect())
    }

    pub(crate) fn for_user(&self, user: UserId) -> StoreResult<Vec<Reservation>> {
        let committed = self.read()?;
        Ok(committed
            .rows
            .iter()
            .filter(|(k, _)| k.user == user)
            .map(|(k, s)| Reservation::new(k.event, k.user, *s))
            .collect())
    }

    /// Every committed row grouped by event, in key order.
    pub(crate) fn dump(&self) -> StoreResult<Vec<(EventId, Vec<Change>)>> {
        let committed = self.read()?;
        let mut grouped: Vec<(EventId, Vec<Change>)> = Vec::new();
        for (key, seats) in &committed.rows {
            let change = Change::Put {
                user: key.user,
                seats: *seats,
            };
            match grouped.last_mut() {
                Some((event, changes)) if *event == key.event => changes.push(change),
                _ => grouped.push((key.event, vec![change])),
            }
        }
        Ok(grouped)
    }

    pub(crate) fn row_count(&self) -> StoreResult<usize> {
        Ok(self.read()?.rows.len())
    }

    /// Open a unit of work on `event`, committing through `sink`.
    pub(crate) fn begin<'a>(
        &'a self,
        event: EventId,
        deadline: Instant,
        sink: &'a dyn CommitSink,
    ) -> StoreResult<TableUnit<'a>> {
        let guard = self.locks.acquire(event, deadline)?;
        Ok(TableUnit {
            table: self,
            sink,
            staged: BTreeMap::new(),
            guard,
        })
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Committed>> {
        self.committed
            .read()
            .map_err(|_| StoreError::poisoned("table"))
    }
}

/// Where a unit of work sends its batch on commit.
pub(crate) trait CommitSink: Send + Sync {
    /// Make `changes` durable (if the backend is durable) and apply them to `table`.
    fn commit(&self, table: &ReservationTable, event: EventId, changes: &[Change]) -> StoreResult<()>;
}

/// A unit of work holding the per-event lock, with writes staged in memory.
pub(crate) struct TableUnit<'a> {
    table: &'a ReservationTable,
    sink: &'a dyn CommitSink,
    staged: BTreeMap<UserId, Option<SeatCount>>,
    guard: EventLockGuard<'a>,
}

impl TableUnit<'_> {
    fn committed_rows(&self) -> StoreResult<BTreeMap<UserId, SeatCount>> {
        let committed = self.table.read()?;
        Ok(committed.event_rows(self.guard.event()).collect())
    }
}

impl UnitOfWork for TableUnit<'_> {
    fn event(&self) -> EventId {
        self.guard.event()
    }

    fn sum_reserved(&self) -> StoreResult<u64> {
        let event = self.guard.event();
        let mut total = self.table.total(event)?;
        for (user, staged) in &self.staged {
            let before = self.table.get(event, *user)?.map_or(0, |s| u64::from(s.get()));
            let after = staged.map_or(0, |s| u64::from(s.get()));
            total = total - before + after;
        }
        Ok(total)
    }

    fn get(&self, user: UserId) -> StoreResult<Option<SeatCount>> {
        match self.staged.get(&user) {
            Some(staged) => Ok(*staged),
            None => self.table.get(self.guard.event(), user),
        }
    }

    fn put(&mut self, user: UserId, seats: SeatCount) -> StoreResult<()> {
        self.staged.insert(user, Some(seats));
        Ok(())
    }

    fn delete(&mut self, user: UserId) -> StoreResult<()> {
        self.staged.insert(user, None);
        Ok(())
    }

    fn reservations(&self) -> StoreResult<Vec<Reservation>> {
        let event = self.guard.event();
        let mut rows = self.committed_rows()?;
        for (user, staged) in &self.staged {
            match staged {
                Some(seats) => {
                    rows.insert(*user, *seats);
                }
                None => {
                    rows.remove(user);
                }
            }
        }
        Ok(rows
            .into_iter()
            .map(|(user, seats)| Reservation::new(event, user, seats))
            .collect())
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let event = self.guard.event();
        if self.staged.is_empty() {
            return Ok(());
        }
        let changes: Vec<Change> = self
            .staged
            .iter()
            .map(|(user, staged)| match staged {
                Some(seats) => Change::Put {
                    user: *user,
                    seats: *seats,
                },
                None => Change::Delete { user: *user },
            })
            .collect();
        self.sink.commit(self.table, event, &changes)?;
        debug!(%event, changes = changes.len(), "unit of work committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(n: u32) -> SeatCount {
        SeatCount::new(n).unwrap()
    }

    #[test]
    fn apply_maintains_totals() {
        let table = ReservationTable::new();
        let e = EventId::new(1);
        table
            .apply(
                e,
                &[
                    Change::Put { user: UserId::new(1), seats: seats(3) },
                    Change::Put { user: UserId::new(2), seats: seats(4) },
                ],
            )
            .unwrap();
        assert_eq!(table.total(e).unwrap(), 7);

        table
            .apply(e, &[Change::Put { user: UserId::new(1), seats: seats(1) }])
            .unwrap();
        assert_eq!(table.total(e).unwrap(), 5);

        table
            .apply(
                e,
                &[
                    Change::Delete { user: UserId::new(2) },
                    Change::Delete { user: UserId::new(9) },
                ],
            )
            .unwrap();
        assert_eq!(table.total(e).unwrap(), 1);
        assert_eq!(table.total(EventId::new(2)).unwrap(), 0);
    }

    #[test]
    fn for_event_is_scoped_and_sorted() {
        let table = ReservationTable::new();
        table
            .apply(EventId::new(2), &[Change::Put { user: UserId::new(5), seats: seats(1) }])
            .unwrap();
        table
            .apply(
                EventId::new(1),
                &[
                    Change::Put { user: UserId::new(9), seats: seats(2) },
                    Change::Put { user: UserId::new(3), seats: seats(1) },
                ],
            )
            .unwrap();

        let rows = table.for_event(EventId::new(1)).unwrap();
        let users: Vec<_> = rows.iter().map(|r| r.user).collect();
        assert_eq!(users, vec![UserId::new(3), UserId::new(9)]);

        let dump = table.dump().unwrap();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump[0].0, EventId::new(1));
        assert_eq!(dump[0].1.len(), 2);
    }
}
