//! Identity types for Vantage entities
//!
//! Teams, insights, dashboards and flags are identified by database integer
//! keys. Each gets its own newtype so a flag ID can never be passed where a
//! team ID is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Common behaviour shared by all integer-backed identifiers.
pub trait IdType: Copy + Eq + Ord + std::hash::Hash + fmt::Display + Send + Sync + 'static {
    /// Wrap a raw integer key.
    fn new(raw: i64) -> Self;

    /// Get the raw integer key.
    fn get(self) -> i64;
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl IdType for $name {
            fn new(raw: i64) -> Self {
                Self(raw)
            }

            fn get(self) -> i64 {
                self.0
            }
        }

        impl $name {
            /// Wrap a raw integer key.
            pub const fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            /// Get the raw integer key.
            pub const fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

define_id!(
    /// Team (project) that owns insights, dashboards and flags.
    TeamId
);
define_id!(
    /// Saved insight whose query results are cached.
    InsightId
);
define_id!(
    /// Dashboard an insight tile is rendered on.
    DashboardId
);
define_id!(
    /// Feature flag primary key.
    FlagId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = FlagId::from_raw(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(" 42 ".parse::<FlagId>().expect("parse"), id);
        assert!("flag-a".parse::<FlagId>().is_err());
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&TeamId::from_raw(7)).expect("serialize");
        assert_eq!(json, "7");
        let back: TeamId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.as_i64(), 7);
    }

    #[test]
    fn test_id_trait_roundtrip() {
        let id = <InsightId as IdType>::new(9);
        assert_eq!(IdType::get(id), 9);
    }
}
