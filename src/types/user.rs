//! User balances and counters.

use serde::{Deserialize, Serialize};

use super::{is_previous_day, is_same_day, Timestamp, UserId};

/// A user as seen by the reward engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identity key
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Spendable balance (earned and spent)
    pub points: u64,
    /// Total ever earned; drives the level and never decreases
    pub lifetime_points: u64,
    /// Click counter
    pub clicks: u64,
    /// Daily login streak (independent of habit streaks)
    pub streak_days: u32,
    /// Last recorded login
    #[serde(default)]
    pub last_login_at: Option<Timestamp>,
}

impl User {
    /// Create a fresh user with zero balances
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            points: 0,
            lifetime_points: 0,
            clicks: 0,
            streak_days: 0,
            last_login_at: None,
        }
    }

    /// Current balance counters
    #[must_use]
    pub fn totals(&self) -> UserTotals {
        UserTotals {
            points: self.points,
            lifetime_points: self.lifetime_points,
            clicks: self.clicks,
        }
    }

    /// Login streak after a login at `now`.
    ///
    /// Returns the new streak and whether it was extended. A second login on
    /// the same day leaves the streak untouched.
    #[must_use]
    pub fn login_streak_at(&self, now: Timestamp) -> (u32, bool) {
        match self.last_login_at {
            Some(last) if is_same_day(last, now) => (self.streak_days.max(1), false),
            Some(last) if is_previous_day(last, now) => (self.streak_days.saturating_add(1), true),
            _ => (1, false),
        }
    }
}

/// Balance counters after an atomic store increment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTotals {
    /// Spendable balance
    pub points: u64,
    /// Lifetime earned points
    pub lifetime_points: u64,
    /// Click counter
    pub clicks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DAY_MS;

    #[test]
    fn test_first_login_starts_streak() {
        let user = User::new(UserId::new(1), "ana");
        assert_eq!(user.login_streak_at(1000), (1, false));
    }

    #[test]
    fn test_login_streak_transitions() {
        let mut user = User::new(UserId::new(1), "ana");
        user.streak_days = 4;
        user.last_login_at = Some(10);

        assert_eq!(user.login_streak_at(DAY_MS + 10), (5, true));
        assert_eq!(user.login_streak_at(20), (4, false));
        assert_eq!(user.login_streak_at(3 * DAY_MS), (1, false));
    }
}
