//! Core data model for the reward engine.
//!
//! Users and habits are created by outer flows and only mutated through the
//! engine. Completions and user achievements are append-only records.

pub mod achievement;
pub mod habit;
pub mod ids;
pub mod user;

use chrono::{DateTime, NaiveDate, Utc};

pub use achievement::{Achievement, Requirement, RequirementError, UserAchievement};
pub use habit::{Difficulty, Habit, HabitCompletion, HabitState};
pub use ids::{HabitId, IdError, UserId};
pub use user::{User, UserTotals};

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// One day in milliseconds
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Current wall-clock time
#[must_use]
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// UTC calendar day a timestamp falls on
#[must_use]
pub fn calendar_day(ts: Timestamp) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ts).map_or(NaiveDate::MIN, |dt| dt.date_naive())
}

/// Whether `earlier` falls on the calendar day right before `now`
#[must_use]
pub fn is_previous_day(earlier: Timestamp, now: Timestamp) -> bool {
    calendar_day(now).pred_opt() == Some(calendar_day(earlier))
}

/// Whether both timestamps fall on the same calendar day
#[must_use]
pub fn is_same_day(a: Timestamp, b: Timestamp) -> bool {
    calendar_day(a) == calendar_day(b)
}
