use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{EventId, UserId};
use crate::seats::SeatCount;

/// Unique key of a reservation row: one row per user per event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationKey {
    pub event: EventId,
    pub user: UserId,
}

impl ReservationKey {
    pub const fn new(event: EventId, user: UserId) -> Self {
        Self { event, user }
    }
}

impl fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event, self.user)
    }
}

/// A seat commitment by one user for one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    pub event: EventId,
    pub user: UserId,
    pub seats: SeatCount,
}

impl Reservation {
    pub const fn new(event: EventId, user: UserId, seats: SeatCount) -> Self {
        Self { event, user, seats }
    }

    pub const fn key(&self) -> ReservationKey {
        ReservationKey::new(self.event, self.user)
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.key(), self.seats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_event_and_user() {
        let r = Reservation::new(EventId::new(1), UserId::new(2), SeatCount::new(3).unwrap());
        assert_eq!(r.key(), ReservationKey::new(EventId::new(1), UserId::new(2)));
        assert_eq!(r.to_string(), "event:1/user:2 x3");
    }

    #[test]
    fn json_uses_named_fields() {
        let r = Reservation::new(EventId::new(5), UserId::new(6), SeatCount::ONE);
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["event"], 5);
        assert_eq!(json["user"], 6);
        assert_eq!(json["seats"], 1);
    }
}
