//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `SocietyId` where a `ChartId` is expected.
//! All ids are database-assigned `BIGSERIAL` values, so ordering by id is insertion order.

use serde::{Deserialize, Serialize};

/// Macro to generate typed ID wrappers around `i64`.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wraps a raw database id.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw database id.
            #[must_use]
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

typed_id!(ChartId, "Unique identifier for a chart header (master or shared reference).");
typed_id!(SocietyId, "Unique identifier for a subscriber society.");
typed_id!(MachineId, "Unique identifier for a consuming collection machine.");
