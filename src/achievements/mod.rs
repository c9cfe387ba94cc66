//! Achievement unlock conditions.
//!
//! Evaluation is pure: given the user's aggregate counters and the set of
//! achievements already unlocked, return the ones that newly qualify. The
//! engine persists each unlock with an insert-or-no-op, which is what makes
//! re-running the evaluator safe.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{Achievement, Requirement};

/// Counters achievements are evaluated against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAggregates {
    /// Completions across all of the user's habits
    pub total_completions: u64,
    /// Highest current streak among the user's habits
    pub current_streak: u32,
}

impl Requirement {
    /// Whether the counters satisfy this requirement
    #[must_use]
    pub fn is_met(&self, aggregates: &UserAggregates) -> bool {
        match *self {
            Self::HabitCount(n) => aggregates.total_completions >= u64::from(n),
            Self::Streak(n) => aggregates.current_streak >= n,
        }
    }
}

fn achievement(id: &str, name: &str, description: &str, requirement: Requirement, reward: u64) -> Achievement {
    Achievement {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        requirement,
        reward,
    }
}

/// Built-in catalog
#[must_use]
pub fn default_catalog() -> Vec<Achievement> {
    vec![
        achievement("first_step", "First Step", "Complete your first habit.", Requirement::HabitCount(1), 10),
        achievement("habit_count_10", "Getting Warmed Up", "Complete 10 habits.", Requirement::HabitCount(10), 50),
        achievement("habit_count_50", "Dedicated", "Complete 50 habits.", Requirement::HabitCount(50), 150),
        achievement("habit_count_100", "Century", "Complete 100 habits.", Requirement::HabitCount(100), 300),
        achievement("streak_3", "On a Roll", "Reach a 3-day streak.", Requirement::Streak(3), 25),
        achievement("streak_7", "Week Warrior", "Reach a 7-day streak.", Requirement::Streak(7), 75),
        achievement("streak_30", "Monthly Master", "Reach a 30-day streak.", Requirement::Streak(30), 250),
        achievement("streak_100", "Unstoppable", "Reach a 100-day streak.", Requirement::Streak(100), 1_000),
    ]
}

/// Finds newly qualifying achievements
#[derive(Clone, Debug)]
pub struct AchievementEvaluator {
    catalog: Vec<Achievement>,
}

impl AchievementEvaluator {
    /// Create with a custom catalog
    #[must_use]
    pub fn new(catalog: Vec<Achievement>) -> Self {
        Self { catalog }
    }

    /// All known achievements
    #[must_use]
    pub fn catalog(&self) -> &[Achievement] {
        &self.catalog
    }

    /// Look up one achievement
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Achievement> {
        self.catalog.iter().find(|a| a.id == id)
    }

    /// Achievements met by `aggregates` and not in `unlocked`, in catalog order
    #[must_use]
    pub fn evaluate<'a>(
        &'a self,
        aggregates: &UserAggregates,
        unlocked: &HashSet<String>,
    ) -> Vec<&'a Achievement> {
        self.catalog
            .iter()
            .filter(|a| !unlocked.contains(&a.id))
            .filter(|a| a.requirement.is_met(aggregates))
            .collect()
    }
}

impl Default for AchievementEvaluator {
    fn default() -> Self {
        Self::new(default_catalog())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(found: &[&Achievement]) -> Vec<String> {
        found.iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn test_catalog_ids_unique() {
        let catalog = default_catalog();
        let unique: HashSet<&str> = catalog.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(unique.len(), catalog.len());
    }

    #[test]
    fn test_first_completion() {
        let evaluator = AchievementEvaluator::default();
        let found = evaluator.evaluate(
            &UserAggregates {
                total_completions: 1,
                current_streak: 1,
            },
            &HashSet::new(),
        );
        assert_eq!(ids(&found), vec!["first_step"]);
    }

    #[test]
    fn test_thresholds_inclusive() {
        let evaluator = AchievementEvaluator::default();
        let found = evaluator.evaluate(
            &UserAggregates {
                total_completions: 10,
                current_streak: 7,
            },
            &HashSet::new(),
        );
        assert_eq!(
            ids(&found),
            vec!["first_step", "habit_count_10", "streak_3", "streak_7"]
        );
    }

    #[test]
    fn test_unlocked_are_skipped() {
        let evaluator = AchievementEvaluator::default();
        let aggregates = UserAggregates {
            total_completions: 10,
            current_streak: 3,
        };
        let first: HashSet<String> = ids(&evaluator.evaluate(&aggregates, &HashSet::new()))
            .into_iter()
            .collect();
        assert_eq!(first.len(), 3);

        // Re-running with the same counters finds nothing new
        assert!(evaluator.evaluate(&aggregates, &first).is_empty());
    }

    #[test]
    fn test_custom_catalog_from_toml() {
        #[derive(Deserialize)]
        struct Catalog {
            achievement: Vec<Achievement>,
        }

        let parsed: Catalog = toml::from_str(
            r#"
            [[achievement]]
            id = "streak_2"
            name = "Two in a Row"
            description = "Two days running."
            requirement = "streak_2"
            reward = 5
            "#,
        )
        .unwrap();
        let evaluator = AchievementEvaluator::new(parsed.achievement);
        let found = evaluator.evaluate(
            &UserAggregates {
                total_completions: 2,
                current_streak: 2,
            },
            &HashSet::new(),
        );
        assert_eq!(ids(&found), vec!["streak_2"]);
        assert_eq!(evaluator.get("streak_2").unwrap().reward, 5);
    }
}
