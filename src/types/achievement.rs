//! Achievement definitions and unlock records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Timestamp, UserId};

/// Typed unlock threshold.
///
/// Serialized as `habit_count_N` or `streak_N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Requirement {
    /// Total habit completions across all habits reach N
    HabitCount(u32),
    /// Current streak reaches N days
    Streak(u32),
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HabitCount(n) => write!(f, "habit_count_{n}"),
            Self::Streak(n) => write!(f, "streak_{n}"),
        }
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |n: &str| {
            n.parse::<u32>()
                .map_err(|_| RequirementError::InvalidThreshold(s.to_string()))
        };
        if let Some(n) = s.strip_prefix("habit_count_") {
            Ok(Self::HabitCount(parse(n)?))
        } else if let Some(n) = s.strip_prefix("streak_") {
            Ok(Self::Streak(parse(n)?))
        } else {
            Err(RequirementError::UnknownKind(s.to_string()))
        }
    }
}

impl TryFrom<String> for Requirement {
    type Error = RequirementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Requirement> for String {
    fn from(value: Requirement) -> Self {
        value.to_string()
    }
}

/// Requirement parsing errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequirementError {
    /// Prefix is neither `habit_count_` nor `streak_`
    #[error("unknown requirement kind: {0}")]
    UnknownKind(String),
    /// Threshold is not a number
    #[error("invalid requirement threshold: {0}")]
    InvalidThreshold(String),
}

/// An unlockable achievement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable id
    pub id: String,
    /// Display name
    pub name: String,
    /// Display description
    pub description: String,
    /// Unlock condition
    pub requirement: Requirement,
    /// Points credited once on unlock
    pub reward: u64,
}

/// Join row: `user` unlocked `achievement_id`. Created at most once per pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievement {
    /// Who unlocked it
    pub user_id: UserId,
    /// What was unlocked
    pub achievement_id: String,
    /// When
    pub unlocked_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_parsing() {
        assert_eq!(
            "habit_count_10".parse::<Requirement>().unwrap(),
            Requirement::HabitCount(10)
        );
        assert_eq!("streak_7".parse::<Requirement>().unwrap(), Requirement::Streak(7));
        assert!(matches!(
            "streak_x".parse::<Requirement>(),
            Err(RequirementError::InvalidThreshold(_))
        ));
        assert!(matches!(
            "login_5".parse::<Requirement>(),
            Err(RequirementError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_requirement_serde_as_string() {
        let json = serde_json::to_string(&Requirement::Streak(30)).unwrap();
        assert_eq!(json, "\"streak_30\"");
        let back: Requirement = serde_json::from_str("\"habit_count_1\"").unwrap();
        assert_eq!(back, Requirement::HabitCount(1));
    }
}
