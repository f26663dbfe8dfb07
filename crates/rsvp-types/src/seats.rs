use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of seats held by a single reservation. Never zero.
///
/// Deserialization goes through [`SeatCount::new`], so persisted rows are
/// validated when they are read back.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SeatCount(u32);

impl SeatCount {
    /// The smallest legal reservation.
    pub const ONE: Self = Self(1);

    pub fn new(seats: u32) -> Result<Self, TypeError> {
        if seats == 0 {
            return Err(TypeError::ZeroSeats);
        }
        Ok(Self(seats))
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for SeatCount {
    type Error = TypeError;

    fn try_from(seats: u32) -> Result<Self, Self::Error> {
        Self::new(seats)
    }
}

impl From<SeatCount> for u32 {
    fn from(seats: SeatCount) -> Self {
        seats.0
    }
}

impl fmt::Debug for SeatCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeatCount({})", self.0)
    }
}

impl fmt::Display for SeatCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum total seats across all reservations of an event. Never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Capacity(u32);

impl Capacity {
    pub fn new(seats: u32) -> Result<Self, TypeError> {
        if seats == 0 {
            return Err(TypeError::ZeroCapacity);
        }
        Ok(Self(seats))
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` if `total` seats fit within this capacity.
    pub fn admits(self, total: u64) -> bool {
        total <= u64::from(self.0)
    }

    /// Seats still free when `reserved` are taken. Saturates at zero.
    pub fn remaining(self, reserved: u64) -> u64 {
        u64::from(self.0).saturating_sub(reserved)
    }
}

impl TryFrom<u32> for Capacity {
    type Error = TypeError;

    fn try_from(seats: u32) -> Result<Self, Self::Error> {
        Self::new(seats)
    }
}

impl From<Capacity> for u32 {
    fn from(capacity: Capacity) -> Self {
        capacity.0
    }
}

impl fmt::Debug for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capacity({})", self.0)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
