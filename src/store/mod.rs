//! Durable store interface.
//!
//! Every write method is one atomic unit: it either applies all of its
//! mutations or none. Balances are only ever changed by increments executed
//! inside the store, never by writing back a value computed by the caller.
//! Habit writes are compare-and-swap on [`Habit::version`].

pub mod memory;
pub mod persistent;

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::leaderboard::UserSnapshot;
use crate::types::{Habit, HabitCompletion, HabitId, Timestamp, User, UserAchievement, UserId, UserTotals};

pub use memory::MemoryStore;
pub use persistent::SledStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures. Any of these aborts the calling operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend cannot serve requests
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Referenced row does not exist
    #[error("missing {0}")]
    Missing(String),
    /// Insert of an existing key
    #[error("duplicate {0}")]
    Duplicate(String),
    /// Encoding or decoding a row failed
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Underlying sled error
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
}

/// Balances around an atomic increment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceChange {
    /// Before the increment
    pub before: UserTotals,
    /// After the increment
    pub after: UserTotals,
}

/// Outcome of committing a click
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickCommit<T> {
    /// Actions counted for the day, including this one
    pub actions_today: u64,
    /// Value produced alongside the credited amount
    pub reward: T,
    /// Balances around the credit
    pub balance: BalanceChange,
}

/// Per-user action counter. Only the latest day seen is kept; an action
/// dated before it counts toward that latest day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActions {
    /// Day being counted
    pub day: NaiveDate,
    /// Actions on `day`
    pub count: u64,
}

impl DailyActions {
    /// Counter after one more action on `day`
    #[must_use]
    pub fn next(current: Option<Self>, day: NaiveDate) -> Self {
        match current {
            Some(c) if c.day >= day => Self {
                day: c.day,
                count: c.count.saturating_add(1),
            },
            _ => Self { day, count: 1 },
        }
    }
}

/// Outcome of committing a habit completion
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionCommit {
    /// Completion recorded, habit written, owner credited
    Committed {
        /// Stored habit (version bumped)
        habit: Habit,
        /// Owner balances
        balance: BalanceChange,
    },
    /// A completion for this habit and day already exists
    AlreadyCompletedToday,
    /// Habit changed since it was read
    Conflict,
}

/// Outcome of a compare-and-swap habit write
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HabitWrite {
    /// Written; carries the stored habit
    Written(Habit),
    /// Habit changed since it was read
    Conflict,
}

/// Outcome of committing a freeze purchase
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseCommit {
    /// Points deducted and token granted
    Committed {
        /// Stored habit (version bumped)
        habit: Habit,
        /// Owner balances after the deduction
        totals: UserTotals,
    },
    /// Balance below cost at commit time
    InsufficientPoints {
        /// Balance at commit time
        have: u64,
    },
    /// Habit changed since it was read
    Conflict,
}

/// Persistence consumed by the engine
pub trait RewardStore: Send + Sync {
    /// Create a user (registration flow)
    fn insert_user(&self, user: &User) -> StoreResult<()>;

    /// Create a habit (habit creation flow)
    fn insert_habit(&self, habit: &Habit) -> StoreResult<()>;

    /// Load a user
    fn user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Load a habit
    fn habit(&self, id: HabitId) -> StoreResult<Option<Habit>>;

    /// All habits owned by a user
    fn habits_for_user(&self, user: UserId) -> StoreResult<Vec<Habit>>;

    /// Whether `habit` has a completion on `day`
    fn completion_exists(&self, habit: HabitId, day: NaiveDate) -> StoreResult<bool>;

    /// Completions across all of a user's habits
    fn completion_count(&self, user: UserId) -> StoreResult<u64>;

    /// Ids of achievements the user has unlocked
    fn unlocked_achievements(&self, user: UserId) -> StoreResult<HashSet<String>>;

    /// Leaderboard snapshots of every user. With `since`, point fields hold
    /// the completion rewards earned at or after `since`.
    fn snapshots(&self, since: Option<Timestamp>) -> StoreResult<Vec<UserSnapshot>>;

    /// Atomically add `amount` to both `points` and `lifetime_points`
    fn credit(&self, user: UserId, amount: u64) -> StoreResult<BalanceChange>;

    /// Atomically count one click and credit its reward.
    ///
    /// `reward` receives the day's action count including this click and
    /// returns the amount to credit plus a value handed back in the commit.
    /// `clicks`, the day counter and both balances change together or not at
    /// all. `reward` runs inside the unit, so it must not call back into the
    /// store. It may run more than once; only the committed run counts.
    fn commit_click<T, F>(&self, user: UserId, day: NaiveDate, reward: F) -> StoreResult<ClickCommit<T>>
    where
        F: FnMut(u64) -> (u64, T);

    /// Atomically apply a login at `now` to the daily login streak
    fn record_login(&self, user: UserId, now: Timestamp) -> StoreResult<User>;

    /// Atomically append `completion`, write `habit` (if its version still
    /// matches) and credit the owner with `completion.points_awarded`
    fn commit_completion(
        &self,
        habit: &Habit,
        completion: &HabitCompletion,
    ) -> StoreResult<CompletionCommit>;

    /// Write `habit` if its version still matches
    fn write_habit(&self, habit: &Habit) -> StoreResult<HabitWrite>;

    /// Atomically deduct `cost` from spendable points (never lifetime points)
    /// and write `habit`, if the balance covers it and the version matches
    fn commit_freeze_purchase(&self, habit: &Habit, cost: u64) -> StoreResult<PurchaseCommit>;

    /// Atomically insert `unlock` and credit `reward`. An existing
    /// (user, achievement) row makes this a no-op returning `None`.
    fn unlock_achievement(
        &self,
        unlock: &UserAchievement,
        reward: u64,
    ) -> StoreResult<Option<BalanceChange>>;
}

/// Behaviour every store must share
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::types::{calendar_day, Difficulty, DAY_MS};

    fn seed<S: RewardStore>(store: &S) -> (User, Habit) {
        let user = User::new(UserId::new(1), "ana");
        let habit = Habit::new(HabitId::new(10), user.id, "run", Difficulty::Easy);
        store.insert_user(&user).unwrap();
        store.insert_habit(&habit).unwrap();
        (user, habit)
    }

    fn completion(habit: &Habit, at: Timestamp, points: u64) -> HabitCompletion {
        HabitCompletion {
            habit_id: habit.id,
            user_id: habit.user_id,
            points_awarded: points,
            completed_at: at,
            is_critical: false,
        }
    }

    pub(crate) fn run_all<S: RewardStore>(make: impl Fn() -> S) {
        duplicate_inserts(&make());
        credit_is_incremental(&make());
        action_counter_per_day(&make());
        click_commit_is_atomic(&make());
        completion_commit(&make());
        completion_version_conflict(&make());
        freeze_purchase(&make());
        achievement_unlock_idempotent(&make());
        windowed_snapshots(&make());
        login_streak(&make());
    }

    fn duplicate_inserts<S: RewardStore>(store: &S) {
        let (user, habit) = seed(store);
        assert!(matches!(store.insert_user(&user), Err(StoreError::Duplicate(_))));
        assert!(matches!(store.insert_habit(&habit), Err(StoreError::Duplicate(_))));
        assert_eq!(store.habits_for_user(user.id).unwrap(), vec![habit]);
        assert!(store.user(UserId::new(99)).unwrap().is_none());
    }

    fn credit_is_incremental<S: RewardStore>(store: &S) {
        let (user, _) = seed(store);
        let first = store.credit(user.id, 30).unwrap();
        assert_eq!(first.before.points, 0);
        assert_eq!(first.after.points, 30);
        let second = store.credit(user.id, 12).unwrap();
        assert_eq!(second.after.lifetime_points, 42);
        assert!(matches!(
            store.credit(UserId::new(99), 1),
            Err(StoreError::Missing(_))
        ));
    }

    fn action_counter_per_day<S: RewardStore>(store: &S) {
        let (user, _) = seed(store);
        let day0 = calendar_day(0);
        let day1 = calendar_day(DAY_MS);
        let count = |day| {
            store
                .commit_click(user.id, day, |n| (n * 10, n))
                .unwrap()
        };
        assert_eq!(count(day0).actions_today, 1);
        let second = count(day0);
        assert_eq!(second.actions_today, 2);
        assert_eq!(second.reward, 2);
        assert_eq!(second.balance.before.points, 10);
        assert_eq!(second.balance.after.points, 30);
        assert_eq!(count(day1).actions_today, 1);
        // Late click for a day already rolled over
        assert_eq!(count(day0).actions_today, 2);

        let stored = store.user(user.id).unwrap().unwrap();
        assert_eq!(stored.clicks, 4);
        assert_eq!(stored.lifetime_points, 10 + 20 + 10 + 20);
    }

    fn click_commit_is_atomic<S: RewardStore>(store: &S) {
        let (user, _) = seed(store);
        let day0 = calendar_day(0);
        let mut calls = 0;
        let missing = store.commit_click(UserId::new(99), day0, |n| {
            calls += 1;
            (n, ())
        });
        assert!(matches!(missing, Err(StoreError::Missing(_))));
        assert_eq!(calls, 0);

        // Nothing from the failed unit is visible to the next one
        let first = store.commit_click(user.id, day0, |n| (n, ())).unwrap();
        assert_eq!(first.actions_today, 1);
        assert_eq!(first.balance.after.clicks, 1);
    }

    fn completion_commit<S: RewardStore>(store: &S) {
        let (user, habit) = seed(store);
        let mut next = habit.clone();
        next.streak = 1;
        next.last_completed_at = Some(1_000);

        let commit = store.commit_completion(&next, &completion(&habit, 1_000, 10)).unwrap();
        let CompletionCommit::Committed { habit: stored, balance } = commit else {
            panic!("expected commit, got {commit:?}");
        };
        assert_eq!(stored.version, habit.version + 1);
        assert_eq!(balance.after.points, 10);
        assert!(store.completion_exists(habit.id, calendar_day(1_000)).unwrap());
        assert_eq!(store.completion_count(user.id).unwrap(), 1);

        // Same day again, even with a fresh version, is rejected
        let again = store.commit_completion(&stored, &completion(&habit, 2_000, 10)).unwrap();
        assert_eq!(again, CompletionCommit::AlreadyCompletedToday);
        assert_eq!(store.user(user.id).unwrap().unwrap().points, 10);
    }

    fn completion_version_conflict<S: RewardStore>(store: &S) {
        let (user, habit) = seed(store);
        let mut touched = habit.clone();
        touched.freeze_count = 1;
        assert!(matches!(store.write_habit(&touched).unwrap(), HabitWrite::Written(_)));

        // Stale version
        let stale = store.commit_completion(&habit, &completion(&habit, 1_000, 10)).unwrap();
        assert_eq!(stale, CompletionCommit::Conflict);
        assert_eq!(store.completion_count(user.id).unwrap(), 0);
        assert_eq!(store.user(user.id).unwrap().unwrap().points, 0);
        assert_eq!(store.write_habit(&habit).unwrap(), HabitWrite::Conflict);
    }

    fn freeze_purchase<S: RewardStore>(store: &S) {
        let (user, habit) = seed(store);
        store.credit(user.id, 150).unwrap();
        let mut next = habit.clone();
        next.freeze_count = 1;

        assert_eq!(
            store.commit_freeze_purchase(&next, 200).unwrap(),
            PurchaseCommit::InsufficientPoints { have: 150 }
        );
        let PurchaseCommit::Committed { habit: stored, totals } =
            store.commit_freeze_purchase(&next, 100).unwrap()
        else {
            panic!("expected purchase");
        };
        assert_eq!(stored.freeze_count, 1);
        assert_eq!(totals.points, 50);
        assert_eq!(totals.lifetime_points, 150);
    }

    fn achievement_unlock_idempotent<S: RewardStore>(store: &S) {
        let (user, _) = seed(store);
        let unlock = UserAchievement {
            user_id: user.id,
            achievement_id: "first_step".into(),
            unlocked_at: 5,
        };
        let first = store.unlock_achievement(&unlock, 10).unwrap();
        assert_eq!(first.unwrap().after.lifetime_points, 10);
        assert!(store.unlock_achievement(&unlock, 10).unwrap().is_none());
        assert_eq!(store.user(user.id).unwrap().unwrap().points, 10);
        assert!(store
            .unlocked_achievements(user.id)
            .unwrap()
            .contains("first_step"));
    }

    fn windowed_snapshots<S: RewardStore>(store: &S) {
        let (user, habit) = seed(store);
        let bob = User::new(UserId::new(2), "bob");
        store.insert_user(&bob).unwrap();
        store.credit(bob.id, 500).unwrap();

        let mut next = habit.clone();
        next.last_completed_at = Some(10 * DAY_MS);
        store
            .commit_completion(&next, &completion(&habit, 10 * DAY_MS, 35))
            .unwrap();

        let all = store.snapshots(None).unwrap();
        let bob_all = all.iter().find(|s| s.user_id == bob.id).unwrap();
        assert_eq!(bob_all.points, 500);

        let recent = store.snapshots(Some(9 * DAY_MS)).unwrap();
        let ana = recent.iter().find(|s| s.user_id == user.id).unwrap();
        let bob_recent = recent.iter().find(|s| s.user_id == bob.id).unwrap();
        assert_eq!(ana.points, 35);
        assert_eq!(ana.lifetime_points, 35);
        assert_eq!(bob_recent.points, 0);

        let none = store.snapshots(Some(11 * DAY_MS)).unwrap();
        assert!(none.iter().all(|s| s.points == 0));
    }

    fn login_streak<S: RewardStore>(store: &S) {
        let (user, _) = seed(store);
        assert_eq!(store.record_login(user.id, 100).unwrap().streak_days, 1);
        assert_eq!(store.record_login(user.id, 200).unwrap().streak_days, 1);
        let next_day = store.record_login(user.id, DAY_MS + 100).unwrap();
        assert_eq!(next_day.streak_days, 2);
        assert_eq!(next_day.last_login_at, Some(DAY_MS + 100));
        assert!(matches!(
            store.record_login(UserId::new(99), 0),
            Err(StoreError::Missing(_))
        ));
    }
}
