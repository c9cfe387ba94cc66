//! Streak transitions.

use rand::Rng;
use tracing::trace;

use super::{HabitConfig, HabitError};
use crate::rewards::{ClickConfig, Odds, OddsTable};
use crate::types::{is_previous_day, Habit, HabitCompletion, Timestamp};

/// A computed, not yet persisted, completion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionTransition {
    /// Habit state after completion
    pub habit: Habit,
    /// Record to append
    pub completion: HabitCompletion,
    /// Difficulty base reward
    pub base_reward: u64,
    /// Final reward credited
    pub points_earned: u64,
    /// Whether the critical roll hit
    pub is_critical: bool,
    /// Streak before the completion
    pub previous_streak: u32,
    /// Streak after the completion
    pub new_streak: u32,
    /// Whether a freeze bridged a missed day
    pub bridged_by_freeze: bool,
}

/// A computed freeze purchase
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreezePurchase {
    /// Habit with the extra token
    pub habit: Habit,
    /// Points to deduct
    pub cost: u64,
}

/// Pure habit state machine
#[derive(Clone, Debug)]
pub struct HabitStreakEngine {
    config: HabitConfig,
    odds: OddsTable,
}

impl HabitStreakEngine {
    /// Create an engine with the habit config and the shared odds table
    #[must_use]
    pub fn new(config: HabitConfig, odds: OddsTable) -> Self {
        Self { config, odds }
    }

    /// Habit configuration
    #[must_use]
    pub fn config(&self) -> &HabitConfig {
        &self.config
    }

    /// Streak a completion at `now` would produce
    #[must_use]
    pub fn next_streak(habit: &Habit, now: Timestamp) -> u32 {
        let continues = habit
            .last_completed_at
            .is_some_and(|last| is_previous_day(last, now));
        if continues || habit.is_currently_frozen {
            habit.streak.saturating_add(1)
        } else {
            1
        }
    }

    /// Complete `habit` at `now`, drawing the critical roll from `rng`
    pub fn complete<R: Rng + ?Sized>(
        &self,
        habit: &Habit,
        now: Timestamp,
        rng: &mut R,
    ) -> Result<CompletionTransition, HabitError> {
        if habit.completed_on_day_of(now) {
            return Err(HabitError::AlreadyCompletedToday);
        }

        let base_reward = habit.difficulty.base_xp();
        let critical: Odds = self.odds.critical(habit.difficulty);
        let is_critical = critical.roll(rng);
        let points_earned = if is_critical {
            critical.multiplier.apply(base_reward)
        } else {
            base_reward
        };

        let previous_streak = habit.streak;
        let new_streak = Self::next_streak(habit, now);
        let bridged_by_freeze = habit.is_currently_frozen
            && !habit
                .last_completed_at
                .is_some_and(|last| is_previous_day(last, now));

        let mut next = habit.clone();
        next.streak = new_streak;
        next.max_streak = next.max_streak.max(new_streak);
        next.last_completed_at = Some(now);
        next.is_currently_frozen = false;

        trace!(
            habit = %habit.id,
            previous_streak,
            new_streak,
            is_critical,
            points_earned,
            "habit completion computed"
        );

        Ok(CompletionTransition {
            completion: HabitCompletion {
                habit_id: habit.id,
                user_id: habit.user_id,
                points_awarded: points_earned,
                completed_at: now,
                is_critical,
            },
            habit: next,
            base_reward,
            points_earned,
            is_critical,
            previous_streak,
            new_streak,
            bridged_by_freeze,
        })
    }

    /// Spend a freeze token so the next completion keeps the streak
    pub fn use_freeze(&self, habit: &Habit, now: Timestamp) -> Result<Habit, HabitError> {
        if habit.freeze_count == 0 {
            return Err(HabitError::NoFreezeAvailable);
        }
        if habit.completed_on_day_of(now) {
            return Err(HabitError::AlreadyCompletedToday);
        }
        if habit.is_currently_frozen {
            return Err(HabitError::NotNeeded);
        }

        let mut next = habit.clone();
        next.freeze_count -= 1;
        next.is_currently_frozen = true;
        Ok(next)
    }

    /// Buy a freeze token with spendable points
    pub fn buy_freeze(&self, habit: &Habit, points: u64) -> Result<FreezePurchase, HabitError> {
        if habit.freeze_count >= self.config.max_freezes {
            return Err(HabitError::FreezeAlreadyOwned);
        }
        let cost = self.config.freeze_cost;
        if points < cost {
            return Err(HabitError::InsufficientPoints { need: cost, have: points });
        }

        let mut next = habit.clone();
        next.freeze_count += 1;
        Ok(FreezePurchase { habit: next, cost })
    }

    /// Odds used for critical rolls
    #[must_use]
    pub fn odds(&self) -> &OddsTable {
        &self.odds
    }
}

impl Default for HabitStreakEngine {
    fn default() -> Self {
        let config = HabitConfig::default();
        let odds = OddsTable::from_config(&ClickConfig::default(), &config);
        Self::new(config, odds)
    }
}
