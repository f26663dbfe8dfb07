//! Per-event exclusive locks with deadlines.
//!
//! Each event gets a slot (a flag plus a condition variable) created on first
//! use. Slots are dropped from the table once no guard or waiter refers to
//! them, so the table only holds events with work in flight.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

use rsvp_types::EventId;

use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct LockSlot {
    held: Mutex<bool>,
    released: Condvar,
}

/// Table of per-event locks. Locks on different events are independent.
#[derive(Default)]
pub(crate) struct EventLocks {
    slots: Mutex<HashMap<EventId, Arc<LockSlot>>>,
}

impl EventLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `event`, waiting at most until `deadline`.
    pub(crate) fn acquire(&self, event: EventId, deadline: Instant) -> StoreResult<EventLockGuard<'_>> {
        let slot = self.slot(event)?;

        {
            let mut held = slot
                .slot
                .held
                .lock()
                .map_err(|_| StoreError::poisoned("event"))?;
            while *held {
                let now = Instant::now();
                if now >= deadline {
                    return Err(StoreError::LockTimeout { event });
                }
                let (guard, _) = slot
                    .slot
                    .released
                    .wait_timeout(held, deadline - now)
                    .map_err(|_| StoreError::poisoned("event"))?;
                held = guard;
            }
            *held = true;
        }

        Ok(EventLockGuard { slot })
    }

    /// Number of events with a live slot.
    #[cfg(test)]
    pub(crate) fn live_slots(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn slot(&self, event: EventId) -> StoreResult<SlotRef<'_>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::poisoned("lock table"))?;
        let slot = Arc::clone(slots.entry(event).or_default());
        Ok(SlotRef {
            table: self,
            event,
            slot,
        })
    }
}

/// A counted reference to a slot; the last one out removes it from the table.
struct SlotRef<'a> {
    table: &'a EventLocks,
    event: EventId,
    slot: Arc<LockSlot>,
}

impl Drop for SlotRef<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .table
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one here.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.event);
        }
    }
}

/// Exclusive hold on one event. Released on drop.
pub(crate) struct EventLockGuard<'a> {
    slot: SlotRef<'a>,
}

impl EventLockGuard<'_> {
    pub(crate) fn event(&self) -> EventId {
        self.slot.event
    }
}

impl Drop for EventLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .slot
            .slot
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *held = false;
        drop(held);
        self.slot.slot.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn soon(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let locks = EventLocks::new();
        let event = EventId::new(1);

        let guard = locks.acquire(event, soon(100)).unwrap();
        let err = locks.acquire(event, soon(20)).err().unwrap();
        assert!(matches!(err, StoreError::LockTimeout { event: e } if e == event));

        drop(guard);
        assert!(locks.acquire(event, soon(20)).is_ok());
    }

    #[test]
    fn different_events_do_not_contend() {
        let locks = EventLocks::new();
        let _a = locks.acquire(EventId::new(1), soon(50)).unwrap();
        let b = locks.acquire(EventId::new(2), soon(50)).unwrap();
        assert_eq!(b.event(), EventId::new(2));
    }

    #[test]
    fn slots_are_pruned_after_release() {
        let locks = EventLocks::new();
        {
            let _g = locks.acquire(EventId::new(7), soon(50)).unwrap();
            assert_eq!(locks.live_slots(), 1);
        }
        assert_eq!(locks.live_slots(), 0);

        let _held = locks.acquire(EventId::new(8), soon(50)).unwrap();
        let _ = locks.acquire(EventId::new(8), soon(5));
        assert_eq!(locks.live_slots(), 1);
    }

    #[test]
    fn waiters_are_serialized() {
        let locks = EventLocks::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..20 {
                        let _g = locks.acquire(EventId::new(3), soon(5_000)).unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.live_slots(), 0);
    }
}
