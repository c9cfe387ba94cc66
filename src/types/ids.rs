//! Identity keys for users and habits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity key of a user
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

/// Identity key of a habit
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(u64);

macro_rules! id_impls {
    ($name:ident, $label:literal) => {
        impl $name {
            /// Wrap a raw key
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Underlying key
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }

            /// Big-endian bytes, so byte order matches numeric order in storage
            #[must_use]
            pub const fn to_be_bytes(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>()
                    .map(Self)
                    .map_err(|_| IdError::Invalid(s.to_string()))
            }
        }
    };
}

id_impls!(UserId, "UserId");
id_impls!(HabitId, "HabitId");

/// Id parsing errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdError {
    /// Not a decimal integer key
    #[error("invalid id: {0:?}")]
    Invalid(String),
}
