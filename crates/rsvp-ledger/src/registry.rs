//! The event registry seam: where the ledger learns an event's capacity.
//!
//! Events are created, edited and deleted by an external collaborator. The
//! ledger only ever asks for capacity by id.

use std::collections::HashMap;
use std::sync::RwLock;

use rsvp_types::{Capacity, EventId};

/// Errors from an event registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registry could not be reached; the lookup may succeed later.
    #[error("event registry unavailable: {0}")]
    Unavailable(String),

    /// The registry returned data the ledger cannot use.
    #[error("invalid registry entry for {event}: {reason}")]
    Invalid { event: EventId, reason: String },

    /// The registry is broken for good; retrying cannot help.
    #[error("event registry poisoned: {0}")]
    Poisoned(String),
}

impl RegistryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Read-only capacity lookup, implemented by whatever owns event records.
pub trait EventRegistry: Send + Sync {
    /// Capacity of `event`, or `Ok(None)` if no such event exists.
    fn capacity_of(&self, event: EventId) -> Result<Option<Capacity>, RegistryError>;
}

/// In-memory event registry for tests, embedding and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryEventRegistry {
    events: RwLock<HashMap<EventId, Capacity>>,
}

impl InMemoryEventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `(event, capacity)` pairs.
    pub fn from_events(events: impl IntoIterator<Item = (EventId, Capacity)>) -> Self {
        Self {
            events: RwLock::new(events.into_iter().collect()),
        }
    }

    /// Register `event`, returning the capacity it replaced, if any.
    pub fn insert(&self, event: EventId, capacity: Capacity) -> Result<Option<Capacity>, RegistryError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| poisoned())?;
        Ok(events.insert(event, capacity))
    }

    /// Forget `event`. Returns `true` if it was registered.
    pub fn remove(&self, event: EventId) -> Result<bool, RegistryError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| poisoned())?;
        Ok(events.remove(&event).is_some())
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> RegistryError {
    RegistryError::Poisoned("registry lock poisoned".into())
}

impl EventRegistry for InMemoryEventRegistry {
    fn capacity_of(&self, event: EventId) -> Result<Option<Capacity>, RegistryError> {
        let events = self
            .events
            .read()
            .map_err(|_| poisoned())?;
        Ok(events.get(&event).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cap(n: u32) -> Capacity {
        Capacity::new(n).unwrap()
    }

    #[test]
    fn lookup_and_replace() {
        let registry = InMemoryEventRegistry::from_events([(EventId::new(1), cap(10))]);
        assert_eq!(registry.capacity_of(EventId::new(1)).unwrap(), Some(cap(10)));
        assert_eq!(registry.capacity_of(EventId::new(2)).unwrap(), None);

        let previous = registry.insert(EventId::new(1), cap(12)).unwrap();
        assert_eq!(previous, Some(cap(10)));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(EventId::new(1)).unwrap());
        assert!(!registry.remove(EventId::new(1)).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(RegistryError::Unavailable("down".into()).is_transient());
        let invalid = RegistryError::Invalid {
            event: EventId::new(1),
            reason: "capacity 0".into(),
        };
        assert!(!invalid.is_transient());
        assert!(!RegistryError::Poisoned("lock".into()).is_transient());
    }

    #[test]
    fn poisoned_lock_is_not_transient() {
        let registry = Arc::new(InMemoryEventRegistry::from_events([(EventId::new(1), cap(10))]));
        let holder = Arc::clone(&registry);
        let _ = thread::spawn(move || {
            let _guard = holder.events.write().unwrap();
            panic!("writer died holding the registry lock");
        })
        .join();

        let err = registry.capacity_of(EventId::new(1)).unwrap_err();
        assert!(matches!(err, RegistryError::Poisoned(_)));
        assert!(!err.is_transient());
        assert!(matches!(registry.insert(EventId::new(2), cap(1)), Err(RegistryError::Poisoned(_))));
    }
}
