//! Strongly-typed identifiers.
//!
//! Every table is keyed by its own id type, and relations are resolved by
//! id lookup rather than embedded references. Numeric ids mirror the
//! `BIGSERIAL` keys of the relational store; pool ids are names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for id parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind} id: {value:?}")]
pub struct ParseIdError {
    kind: &'static str,
    value: String,
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database key.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// The raw database key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self).map_err(|_| ParseIdError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a ship.
    ShipId,
    "ship"
);

numeric_id!(
    /// Identifier of a docking bay.
    BayId,
    "bay"
);

numeric_id!(
    /// Identifier of a habitat section.
    SectionId,
    "section"
);

numeric_id!(
    /// Identifier of a crew member.
    CrewMemberId,
    "crew member"
);

/// Identifier of a resource pool (a power grid).
///
/// # Examples
///
/// ```
/// use nexus_core::PoolId;
///
/// let pool = PoolId::new("main");
/// assert_eq!(pool.as_str(), "main");
/// assert!("".parse::<PoolId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(String);

impl PoolId {
    /// Create a pool id from trusted input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the pool id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new("main")
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PoolId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseIdError {
                kind: "pool",
                value: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for PoolId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
