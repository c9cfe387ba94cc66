//! The engine's exposed operations.
//!
//! Each operation reads what it needs, runs the pure component for its
//! action, commits through one atomic store unit, and only then evaluates
//! follow-ups (level-ups, achievements). Events are returned in the outcome
//! and handed to the dispatcher after the commit.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, error};

use crate::achievements::{AchievementEvaluator, UserAggregates};
use crate::combo::ComboTracker;
use crate::config::EngineConfig;
use crate::events::{dispatch_all, EngineEvent, EventDispatcher};
use crate::habits::{HabitError, HabitStreakEngine};
use crate::leaderboard::{LeaderboardMetric, LeaderboardRanker, LeaderboardWindow, RankedEntry};
use crate::progression::{LevelCalculator, LevelProgress, LevelUp, Multiplier};
use crate::rewards::{ad_reward, ClickInput, ClickRewardCalculator, OddsTable, RiskPenalty};
use crate::store::{
    CompletionCommit, HabitWrite, PurchaseCommit, RewardStore, StoreError,
};
use crate::types::{
    calendar_day, Habit, HabitId, Timestamp, User, UserAchievement, UserId, UserTotals,
};

/// Attempts before a contended habit write gives up
pub const MAX_HABIT_ATTEMPTS: usize = 3;

/// Engine failures
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Precondition failure from the habit state machine
    #[error(transparent)]
    Habit(#[from] HabitError),
    /// Store failure; nothing was persisted by the failing unit
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Unknown user or habit
    #[error("{0} not found")]
    NotFound(String),
    /// Habit belongs to someone else
    #[error("habit {habit} does not belong to user {user}")]
    Unauthorized {
        /// Caller
        user: UserId,
        /// Requested habit
        habit: HabitId,
    },
    /// Concurrent writers kept changing the habit
    #[error("habit {0} changed during every attempt")]
    Contended(HabitId),
}

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;

/// Result of `record_click`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClickOutcome {
    /// Points for the click itself
    pub reward: u64,
    /// Daily milestone bonus
    pub daily_bonus: u64,
    /// Whether the lucky roll hit
    pub is_lucky: bool,
    /// Lucky multiplier used
    pub lucky_multiplier: Multiplier,
    /// Combo chain length
    pub combo_count: u32,
    /// Balances after the credit
    pub new_totals: UserTotals,
    /// Notifications raised
    pub events: Vec<EngineEvent>,
}

/// Result of `record_login`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    /// Daily login streak after this login
    pub streak_days: u32,
    /// Whether this login extended the streak
    pub extended: bool,
}

/// Result of `record_ad_view`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdOutcome {
    /// Points credited
    pub reward: u64,
    /// Balances after the credit
    pub new_totals: UserTotals,
    /// Notifications raised
    pub events: Vec<EngineEvent>,
}

/// Result of `complete_habit`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    /// Points credited for the completion (excluding achievement rewards)
    pub points_earned: u64,
    /// Whether the critical roll hit
    pub is_critical: bool,
    /// Habit streak after completion
    pub new_streak: u32,
    /// Level change caused by the completion and its achievements
    pub leveled_up: Option<LevelUp>,
    /// Ids of achievements unlocked by this completion
    pub new_achievements: Vec<String>,
    /// Balances after every credit
    pub new_totals: UserTotals,
    /// Notifications raised
    pub events: Vec<EngineEvent>,
}

/// Result of an achievement pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AchievementOutcome {
    /// Ids unlocked in this pass
    pub unlocked: Vec<String>,
    /// Balances after the last credit, if any
    pub totals: Option<UserTotals>,
}

/// Result of a freeze purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PurchaseOutcome {
    /// Habit holding the new token
    pub habit: Habit,
    /// Balances after the deduction
    pub new_totals: UserTotals,
}

/// Everything shown on a user page
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    /// Stored user
    pub user: User,
    /// Level and progress toward the next one
    pub level: LevelProgress,
    /// Owned habits
    pub habits: Vec<Habit>,
    /// Unlocked achievement ids, sorted
    pub achievements: Vec<String>,
}

/// Reward and progression engine over a store
pub struct RewardEngine<S> {
    store: Arc<S>,
    combos: Arc<ComboTracker>,
    clicks: ClickRewardCalculator,
    habits: HabitStreakEngine,
    achievements: AchievementEvaluator,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl<S: RewardStore> RewardEngine<S> {
    /// Build an engine from config
    pub fn new(store: Arc<S>, config: &EngineConfig, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        let odds = OddsTable::from_config(&config.click, &config.habits);
        Self {
            store,
            combos: Arc::new(ComboTracker::new(config.combo.clone())),
            clicks: ClickRewardCalculator::new(config.click.clone()),
            habits: HabitStreakEngine::new(config.habits.clone(), odds),
            achievements: AchievementEvaluator::new(config.achievements.clone()),
            dispatcher,
        }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Combo cache, shared with the sweeper
    pub fn combos(&self) -> &Arc<ComboTracker> {
        &self.combos
    }

    /// Odds used for lucky and critical rolls
    pub fn odds(&self) -> &OddsTable {
        self.habits.odds()
    }

    fn load_user(&self, id: UserId) -> EngineResult<User> {
        self.store
            .user(id)
            .map_err(|e| self.store_failure("load user", e))?
            .ok_or_else(|| EngineError::NotFound(format!("user {id}")))
    }

    fn load_owned_habit(&self, user: UserId, id: HabitId) -> EngineResult<Habit> {
        let habit = self
            .store
            .habit(id)
            .map_err(|e| self.store_failure("load habit", e))?
            .ok_or_else(|| EngineError::NotFound(format!("habit {id}")))?;
        if habit.user_id != user {
            debug!(user = %user, habit = %id, owner = %habit.user_id, "habit access denied");
            return Err(EngineError::Unauthorized { user, habit: id });
        }
        Ok(habit)
    }

    fn store_failure(&self, op: &str, err: StoreError) -> EngineError {
        error!(op, error = %err, "store failure");
        EngineError::Store(err)
    }

    fn notify(&self, events: &[EngineEvent]) {
        if !events.is_empty() {
            dispatch_all(self.dispatcher.as_ref(), events);
        }
    }

    /// Record one click and credit its reward
    pub fn record_click<R: Rng + ?Sized>(
        &self,
        user_id: UserId,
        now: Timestamp,
        risk: RiskPenalty,
        rng: &mut R,
    ) -> EngineResult<ClickOutcome> {
        let user = self.load_user(user_id)?;
        let combo = self.combos.register(user_id, now);
        let level = LevelCalculator::for_points(user.lifetime_points);

        let commit = self
            .store
            .commit_click(user_id, calendar_day(now), |actions_today| {
                let input = ClickInput {
                    streak_days: user.streak_days,
                    actions_today,
                    level,
                    combo,
                    risk,
                };
                let reward = self.clicks.calculate(&input, &mut *rng);
                (reward.total(), reward)
            })
            .map_err(|e| self.store_failure("commit click", e))?;
        let (reward, balance) = (commit.reward, commit.balance);

        debug!(
            user = %user_id,
            reward = reward.reward,
            daily_bonus = reward.daily_bonus,
            is_lucky = reward.is_lucky,
            combo = reward.combo_count,
            "click recorded"
        );

        let events: Vec<EngineEvent> =
            LevelCalculator::level_up(balance.before.lifetime_points, balance.after.lifetime_points)
                .map(|change| EngineEvent::level_up(user_id, change))
                .into_iter()
                .collect();
        self.notify(&events);

        Ok(ClickOutcome {
            reward: reward.reward,
            daily_bonus: reward.daily_bonus,
            is_lucky: reward.is_lucky,
            lucky_multiplier: reward.lucky_multiplier,
            combo_count: reward.combo_count,
            new_totals: balance.after,
            events,
        })
    }

    /// Record a daily login
    pub fn record_login(&self, user_id: UserId, now: Timestamp) -> EngineResult<LoginOutcome> {
        let before = self.load_user(user_id)?;
        let (_, extended) = before.login_streak_at(now);
        let after = self
            .store
            .record_login(user_id, now)
            .map_err(|e| self.store_failure("record login", e))?;
        debug!(user = %user_id, streak = after.streak_days, extended, "login recorded");
        Ok(LoginOutcome {
            streak_days: after.streak_days,
            extended,
        })
    }

    /// Credit one rewarded-ad view
    pub fn record_ad_view(&self, user_id: UserId, risk: RiskPenalty) -> EngineResult<AdOutcome> {
        let user = self.load_user(user_id)?;
        let reward = ad_reward(&LevelCalculator::for_points(user.lifetime_points), risk);
        let balance = self
            .store
            .credit(user_id, reward)
            .map_err(|e| self.store_failure("credit ad view", e))?;
        debug!(user = %user_id, reward, "ad view recorded");

        let events: Vec<EngineEvent> =
            LevelCalculator::level_up(balance.before.lifetime_points, balance.after.lifetime_points)
                .map(|change| EngineEvent::level_up(user_id, change))
                .into_iter()
                .collect();
        self.notify(&events);

        Ok(AdOutcome {
            reward,
            new_totals: balance.after,
            events,
        })
    }

    /// Complete a habit owned by `user_id`
    pub fn complete_habit<R: Rng + ?Sized>(
        &self,
        user_id: UserId,
        habit_id: HabitId,
        now: Timestamp,
        rng: &mut R,
    ) -> EngineResult<CompletionOutcome> {
        let day = calendar_day(now);

        for attempt in 1..=MAX_HABIT_ATTEMPTS {
            let habit = self.load_owned_habit(user_id, habit_id)?;
            let exists = self
                .store
                .completion_exists(habit_id, day)
                .map_err(|e| self.store_failure("check completion", e))?;
            if exists {
                debug!(user = %user_id, habit = %habit_id, "habit already completed today");
                return Err(HabitError::AlreadyCompletedToday.into());
            }

            let transition = self.habits.complete(&habit, now, rng)?;
            let commit = self
                .store
                .commit_completion(&transition.habit, &transition.completion)
                .map_err(|e| self.store_failure("commit completion", e))?;

            let balance = match commit {
                CompletionCommit::Committed { balance, .. } => balance,
                CompletionCommit::AlreadyCompletedToday => {
                    return Err(HabitError::AlreadyCompletedToday.into());
                }
                CompletionCommit::Conflict => {
                    debug!(habit = %habit_id, attempt, "habit changed concurrently, retrying");
                    continue;
                }
            };

            debug!(
                user = %user_id,
                habit = %habit_id,
                points = transition.points_earned,
                critical = transition.is_critical,
                streak = transition.new_streak,
                "habit completed"
            );

            // Completion is durable from here on
            let mut unlocked = AchievementOutcome::default();
            if let Err(err) = self.unlock_achievements(user_id, now, &mut unlocked) {
                error!(
                    user = %user_id,
                    habit = %habit_id,
                    unlocked = unlocked.unlocked.len(),
                    error = %err,
                    "achievement pass failed after completion"
                );
            }
            let new_totals = unlocked.totals.unwrap_or(balance.after);

            let leveled_up =
                LevelCalculator::level_up(balance.before.lifetime_points, new_totals.lifetime_points);
            let mut events: Vec<EngineEvent> = leveled_up
                .map(|change| EngineEvent::level_up(user_id, change))
                .into_iter()
                .collect();
            events.extend(self.achievement_events(user_id, &unlocked.unlocked));
            self.notify(&events);

            return Ok(CompletionOutcome {
                points_earned: transition.points_earned,
                is_critical: transition.is_critical,
                new_streak: transition.new_streak,
                leveled_up,
                new_achievements: unlocked.unlocked,
                new_totals,
                events,
            });
        }

        Err(EngineError::Contended(habit_id))
    }

    /// Run the achievement pass for a user on its own.
    ///
    /// Safe to repeat: already-unlocked achievements are skipped by the
    /// evaluator and, under races, by the store's insert-or-no-op.
    pub fn evaluate_achievements(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> EngineResult<AchievementOutcome> {
        let before = self.load_user(user_id)?;
        let mut outcome = AchievementOutcome::default();
        self.unlock_achievements(user_id, now, &mut outcome)?;

        if let Some(totals) = outcome.totals {
            let mut events: Vec<EngineEvent> =
                LevelCalculator::level_up(before.lifetime_points, totals.lifetime_points)
                    .map(|change| EngineEvent::level_up(user_id, change))
                    .into_iter()
                    .collect();
            events.extend(self.achievement_events(user_id, &outcome.unlocked));
            self.notify(&events);
        }
        Ok(outcome)
    }

    fn aggregates(&self, user_id: UserId) -> EngineResult<UserAggregates> {
        let total_completions = self
            .store
            .completion_count(user_id)
            .map_err(|e| self.store_failure("count completions", e))?;
        let current_streak = self
            .store
            .habits_for_user(user_id)
            .map_err(|e| self.store_failure("load habits", e))?
            .iter()
            .map(|h| h.streak)
            .max()
            .unwrap_or(0);
        Ok(UserAggregates {
            total_completions,
            current_streak,
        })
    }

    /// Unlock everything newly earned. Each unlock commits on its own and is
    /// recorded in `outcome` as it lands, so a failure keeps the earlier ones.
    fn unlock_achievements(
        &self,
        user_id: UserId,
        now: Timestamp,
        outcome: &mut AchievementOutcome,
    ) -> EngineResult<()> {
        let aggregates = self.aggregates(user_id)?;
        let already = self
            .store
            .unlocked_achievements(user_id)
            .map_err(|e| self.store_failure("load achievements", e))?;

        for achievement in self.achievements.evaluate(&aggregates, &already) {
            let unlock = UserAchievement {
                user_id,
                achievement_id: achievement.id.clone(),
                unlocked_at: now,
            };
            let credited = self
                .store
                .unlock_achievement(&unlock, achievement.reward)
                .map_err(|e| self.store_failure("unlock achievement", e))?;
            if let Some(balance) = credited {
                debug!(user = %user_id, achievement = %achievement.id, reward = achievement.reward, "achievement unlocked");
                outcome.unlocked.push(achievement.id.clone());
                outcome.totals = Some(balance.after);
            }
        }
        Ok(())
    }

    fn achievement_events(&self, user_id: UserId, ids: &[String]) -> Vec<EngineEvent> {
        ids.iter()
            .filter_map(|id| self.achievements.get(id))
            .map(|a| EngineEvent::achievement(user_id, a))
            .collect()
    }

    /// Spend the habit's freeze token
    pub fn use_freeze(&self, user_id: UserId, habit_id: HabitId, now: Timestamp) -> EngineResult<Habit> {
        for attempt in 1..=MAX_HABIT_ATTEMPTS {
            let habit = self.load_owned_habit(user_id, habit_id)?;
            let next = self.habits.use_freeze(&habit, now)?;
            match self
                .store
                .write_habit(&next)
                .map_err(|e| self.store_failure("write habit", e))?
            {
                HabitWrite::Written(stored) => {
                    debug!(user = %user_id, habit = %habit_id, "freeze used");
                    return Ok(stored);
                }
                HabitWrite::Conflict => {
                    debug!(habit = %habit_id, attempt, "habit changed concurrently, retrying");
                }
            }
        }
        Err(EngineError::Contended(habit_id))
    }

    /// Buy a freeze token with spendable points
    pub fn buy_freeze(&self, user_id: UserId, habit_id: HabitId) -> EngineResult<PurchaseOutcome> {
        for attempt in 1..=MAX_HABIT_ATTEMPTS {
            let habit = self.load_owned_habit(user_id, habit_id)?;
            let user = self.load_user(user_id)?;
            let purchase = self.habits.buy_freeze(&habit, user.points)?;
            match self
                .store
                .commit_freeze_purchase(&purchase.habit, purchase.cost)
                .map_err(|e| self.store_failure("commit freeze purchase", e))?
            {
                PurchaseCommit::Committed { habit, totals } => {
                    debug!(user = %user_id, habit = %habit_id, cost = purchase.cost, "freeze bought");
                    return Ok(PurchaseOutcome {
                        habit,
                        new_totals: totals,
                    });
                }
                PurchaseCommit::InsufficientPoints { have } => {
                    return Err(HabitError::InsufficientPoints {
                        need: purchase.cost,
                        have,
                    }
                    .into());
                }
                PurchaseCommit::Conflict => {
                    debug!(habit = %habit_id, attempt, "habit changed concurrently, retrying");
                }
            }
        }
        Err(EngineError::Contended(habit_id))
    }

    /// Rank users by `metric` over `window`
    pub fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        window: LeaderboardWindow,
        now: Timestamp,
        limit: Option<usize>,
    ) -> EngineResult<Vec<RankedEntry>> {
        let snapshots = self
            .store
            .snapshots(window.since(now))
            .map_err(|e| self.store_failure("load snapshots", e))?;
        Ok(LeaderboardRanker::rank(&snapshots, metric, limit))
    }

    /// User, level progress, habits and achievements
    pub fn profile(&self, user_id: UserId) -> EngineResult<UserProfile> {
        let user = self.load_user(user_id)?;
        let habits = self
            .store
            .habits_for_user(user_id)
            .map_err(|e| self.store_failure("load habits", e))?;
        let mut achievements: Vec<String> = self
            .store
            .unlocked_achievements(user_id)
            .map_err(|e| self.store_failure("load achievements", e))?
            .into_iter()
            .collect();
        achievements.sort();
        Ok(UserProfile {
            level: LevelCalculator::progress(user.lifetime_points),
            user,
            habits,
            achievements,
        })
    }
}
