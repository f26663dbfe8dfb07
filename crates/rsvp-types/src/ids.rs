use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Display prefix, also accepted by [`FromStr`].
            pub const PREFIX: &'static str = $prefix;

            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            /// Parses either the bare number (`42`) or the display form (`event:42`).
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s
                    .strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .unwrap_or(s);
                digits.parse::<u64>().map(Self).map_err(|e| TypeError::InvalidId {
                    input: s.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    };
}

numeric_id!(
    /// Identifier of an event, issued by the event registry.
    EventId,
    "event"
);

numeric_id!(
    /// Identifier of a user, issued by the account system.
    UserId,
    "user"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        assert_eq!(EventId::new(42).to_string(), "event:42");
        assert_eq!(UserId::new(7).to_string(), "user:7");
    }

    #[test]
    fn parse_accepts_bare_and_prefixed_forms() {
        assert_eq!("42".parse::<EventId>().unwrap(), EventId::new(42));
        assert_eq!("event:42".parse::<EventId>().unwrap(), EventId::new(42));
        assert_eq!("user:7".parse::<UserId>().unwrap(), UserId::new(7));
    }

    #[test]
    fn parse_rejects_foreign_prefix() {
        let err = "user:7".parse::<EventId>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidId { .. }));
        assert!("".parse::<UserId>().is_err());
        assert!("-1".parse::<UserId>().is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&EventId::new(9)).unwrap();
        assert_eq!(json, "9");
        let parsed: UserId = serde_json::from_str("11").unwrap();
        assert_eq!(parsed, UserId::new(11));
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(EventId::new(1) < EventId::new(2));
        assert!(UserId::new(10) > UserId::new(3));
    }
}
