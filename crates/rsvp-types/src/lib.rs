//! Foundation types for the reservation ledger.
//!
//! Every other crate in the workspace depends on `rsvp-types`.
//!
//! # Key Types
//!
//! - [`EventId`] / [`UserId`] -- opaque identifiers issued by external collaborators
//! - [`Capacity`] -- maximum seats for an event (always at least one)
//! - [`SeatCount`] -- seats held by one reservation (always at least one)
//! - [`Reservation`] -- a typed `(event, user, seats)` row
//! - [`ReservationKey`] -- the unique `(event, user)` key of a row

pub mod error;
pub mod ids;
pub mod reservation;
pub mod seats;

pub use error::TypeError;
pub use ids::{EventId, UserId};
pub use reservation::{Reservation, ReservationKey};
pub use seats::{Capacity, SeatCount};
