//! Habits, their streak fields and the append-only completion record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{is_same_day, HabitId, Timestamp, UserId};

/// Habit difficulty tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// 10 XP
    Easy,
    /// 20 XP
    Medium,
    /// 35 XP
    Hard,
    /// 50 XP
    VeryHard,
    /// 100 XP
    Epic,
}

impl Difficulty {
    /// All tiers, easiest first
    pub const ALL: [Self; 5] = [
        Self::Easy,
        Self::Medium,
        Self::Hard,
        Self::VeryHard,
        Self::Epic,
    ];

    /// Fixed base reward for completing a habit of this tier
    #[must_use]
    pub const fn base_xp(self) -> u64 {
        match self {
            Self::Easy => 10,
            Self::Medium => 20,
            Self::Hard => 35,
            Self::VeryHard => 50,
            Self::Epic => 100,
        }
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
            Self::Epic => "epic",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown difficulty: {s}"))
    }
}

/// Streak state of a habit relative to a given day
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HabitState {
    /// Not completed today, no freeze active
    Idle,
    /// Already completed today
    CompletedToday,
    /// A freeze is bridging the gap to the next completion
    Frozen,
}

/// A habit owned by one user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    /// Identity key
    pub id: HabitId,
    /// Owner
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Difficulty tier
    pub difficulty: Difficulty,
    /// Consecutive-day counter
    pub streak: u32,
    /// Highest streak ever reached
    pub max_streak: u32,
    /// Last completion, if any
    pub last_completed_at: Option<Timestamp>,
    /// Whether a freeze is currently bridging a missed day
    pub is_currently_frozen: bool,
    /// Owned freeze tokens
    pub freeze_count: u8,
    /// Bumped on every write, used for compare-and-swap updates
    #[serde(default)]
    pub version: u64,
}

impl Habit {
    /// Create a fresh habit
    #[must_use]
    pub fn new(id: HabitId, user_id: UserId, name: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            id,
            user_id,
            name: name.into(),
            difficulty,
            streak: 0,
            max_streak: 0,
            last_completed_at: None,
            is_currently_frozen: false,
            freeze_count: 0,
            version: 0,
        }
    }

    /// Whether the last completion falls on the same calendar day as `now`
    #[must_use]
    pub fn completed_on_day_of(&self, now: Timestamp) -> bool {
        self.last_completed_at.is_some_and(|last| is_same_day(last, now))
    }

    /// Streak state as of `now`
    #[must_use]
    pub fn state(&self, now: Timestamp) -> HabitState {
        if self.completed_on_day_of(now) {
            HabitState::CompletedToday
        } else if self.is_currently_frozen {
            HabitState::Frozen
        } else {
            HabitState::Idle
        }
    }
}

/// Immutable record of one successful completion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitCompletion {
    /// Completed habit
    pub habit_id: HabitId,
    /// Owner credited
    pub user_id: UserId,
    /// Final points credited
    pub points_awarded: u64,
    /// When it was completed
    pub completed_at: Timestamp,
    /// Whether the critical-success roll hit
    pub is_critical: bool,
}
