//! Fixed-point reward multipliers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A multiplier stored in hundredths, so `floor(x * m)` is exact
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    /// 1.0x
    pub const ONE: Self = Self(100);

    /// From hundredths (`150` = 1.5x)
    #[must_use]
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    /// Whole multiplier (`2` = 2.0x)
    #[must_use]
    pub const fn whole(times: u32) -> Self {
        Self(times.saturating_mul(100))
    }

    /// Raw hundredths
    #[must_use]
    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Floating-point view, for display
    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 100.0
    }

    /// `floor(amount * self)`
    #[must_use]
    pub fn apply(self, amount: u64) -> u64 {
        let scaled = u128::from(amount) * u128::from(self.0) / 100;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}x", self.0 / 100, self.0 % 100)
    }
}
