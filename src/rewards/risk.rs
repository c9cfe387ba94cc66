//! Risk penalty supplied by the external risk scorer.

use serde::{Deserialize, Serialize};

/// Reward factor in `(0, 1]`; 1.0 means no penalty
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RiskPenalty(f64);

impl RiskPenalty {
    /// No penalty
    pub const NONE: Self = Self(1.0);

    /// Validate a raw factor
    pub fn new(factor: f64) -> Result<Self, RiskPenaltyError> {
        if factor.is_finite() && factor > 0.0 && factor <= 1.0 {
            Ok(Self(factor))
        } else {
            Err(RiskPenaltyError::OutOfRange(factor))
        }
    }

    /// Raw factor
    #[must_use]
    pub fn factor(self) -> f64 {
        self.0
    }

    /// `floor(amount * factor)`
    #[must_use]
    pub fn apply(self, amount: u64) -> u64 {
        if self.0 >= 1.0 {
            return amount;
        }
        (amount as f64 * self.0).floor() as u64
    }
}

impl Default for RiskPenalty {
    fn default() -> Self {
        Self::NONE
    }
}

impl TryFrom<f64> for RiskPenalty {
    type Error = RiskPenaltyError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RiskPenalty> for f64 {
    fn from(value: RiskPenalty) -> Self {
        value.0
    }
}

/// Invalid risk factor
#[derive(Debug, Clone, thiserror::Error)]
pub enum RiskPenaltyError {
    /// Not in `(0, 1]`
    #[error("risk penalty must be in (0, 1], got {0}")]
    OutOfRange(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range() {
        assert!(RiskPenalty::new(1.0).is_ok());
        assert!(RiskPenalty::new(0.01).is_ok());
        assert!(RiskPenalty::new(0.0).is_err());
        assert!(RiskPenalty::new(1.5).is_err());
        assert!(RiskPenalty::new(f64::NAN).is_err());
    }

    #[test]
    fn test_apply_floors() {
        let half = RiskPenalty::new(0.5).unwrap();
        assert_eq!(half.apply(4), 2);
        assert_eq!(half.apply(5), 2);
        assert_eq!(RiskPenalty::NONE.apply(u64::MAX), u64::MAX);
    }
}
