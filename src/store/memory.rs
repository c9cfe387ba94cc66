//! In-process store.
//!
//! All state sits behind one mutex, so each trait method is trivially one
//! atomic unit. Used by tests and by ephemeral deployments (`--memory`).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use super::{
    BalanceChange, ClickCommit, CompletionCommit, DailyActions, HabitWrite, PurchaseCommit,
    RewardStore, StoreError, StoreResult,
};
use crate::leaderboard::UserSnapshot;
use crate::types::{
    calendar_day, Habit, HabitCompletion, HabitId, Timestamp, User, UserAchievement, UserId,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    habits: HashMap<HabitId, Habit>,
    completions: Vec<HabitCompletion>,
    completion_days: HashSet<(HabitId, NaiveDate)>,
    daily_actions: HashMap<UserId, DailyActions>,
    achievements: HashMap<(UserId, String), UserAchievement>,
}

impl MemoryState {
    fn user_mut(&mut self, id: UserId) -> StoreResult<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("user {id}")))
    }

    fn credit(&mut self, id: UserId, amount: u64) -> StoreResult<BalanceChange> {
        let user = self.user_mut(id)?;
        let before = user.totals();
        user.points = user.points.saturating_add(amount);
        user.lifetime_points = user.lifetime_points.saturating_add(amount);
        Ok(BalanceChange {
            before,
            after: user.totals(),
        })
    }

    fn version_matches(&self, habit: &Habit) -> StoreResult<bool> {
        self.habits
            .get(&habit.id)
            .map(|stored| stored.version == habit.version)
            .ok_or_else(|| StoreError::Missing(format!("habit {}", habit.id)))
    }

    fn write_habit(&mut self, habit: &Habit) -> Habit {
        let mut stored = habit.clone();
        stored.version += 1;
        self.habits.insert(stored.id, stored.clone());
        stored
    }
}

/// Store backed by process memory
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every call fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RewardStore for MemoryStore {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Duplicate(format!("user {}", user.id)));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    fn insert_habit(&self, habit: &Habit) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state.habits.contains_key(&habit.id) {
            return Err(StoreError::Duplicate(format!("habit {}", habit.id)));
        }
        state.habits.insert(habit.id, habit.clone());
        Ok(())
    }

    fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn habit(&self, id: HabitId) -> StoreResult<Option<Habit>> {
        Ok(self.lock()?.habits.get(&id).cloned())
    }

    fn habits_for_user(&self, user: UserId) -> StoreResult<Vec<Habit>> {
        let state = self.lock()?;
        let mut habits: Vec<Habit> = state
            .habits
            .values()
            .filter(|h| h.user_id == user)
            .cloned()
            .collect();
        habits.sort_by_key(|h| h.id);
        Ok(habits)
    }

    fn completion_exists(&self, habit: HabitId, day: NaiveDate) -> StoreResult<bool> {
        Ok(self.lock()?.completion_days.contains(&(habit, day)))
    }

    fn completion_count(&self, user: UserId) -> StoreResult<u64> {
        let state = self.lock()?;
        Ok(state.completions.iter().filter(|c| c.user_id == user).count() as u64)
    }

    fn unlocked_achievements(&self, user: UserId) -> StoreResult<HashSet<String>> {
        let state = self.lock()?;
        Ok(state
            .achievements
            .keys()
            .filter(|(owner, _)| *owner == user)
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn snapshots(&self, since: Option<Timestamp>) -> StoreResult<Vec<UserSnapshot>> {
        let state = self.lock()?;
        let mut snapshots: Vec<UserSnapshot> = state.users.values().map(UserSnapshot::from_user).collect();

        if let Some(since) = since {
            let mut earned: HashMap<UserId, u64> = HashMap::new();
            for c in state.completions.iter().filter(|c| c.completed_at >= since) {
                *earned.entry(c.user_id).or_insert(0) += c.points_awarded;
            }
            for snapshot in &mut snapshots {
                let windowed = earned.get(&snapshot.user_id).copied().unwrap_or(0);
                snapshot.points = windowed;
                snapshot.lifetime_points = windowed;
            }
        }

        Ok(snapshots)
    }

    fn credit(&self, user: UserId, amount: u64) -> StoreResult<BalanceChange> {
        self.lock()?.credit(user, amount)
    }

    fn commit_click<T, F>(&self, user: UserId, day: NaiveDate, mut reward: F) -> StoreResult<ClickCommit<T>>
    where
        F: FnMut(u64) -> (u64, T),
    {
        let mut state = self.lock()?;
        state.user_mut(user)?;
        let actions = DailyActions::next(state.daily_actions.get(&user).copied(), day);
        let (amount, value) = reward(actions.count);

        let u = state.user_mut(user)?;
        u.clicks = u.clicks.saturating_add(1);
        let balance = state.credit(user, amount)?;
        state.daily_actions.insert(user, actions);
        Ok(ClickCommit {
            actions_today: actions.count,
            reward: value,
            balance,
        })
    }

    fn record_login(&self, user: UserId, now: Timestamp) -> StoreResult<User> {
        let mut state = self.lock()?;
        let u = state.user_mut(user)?;
        let (streak, _) = u.login_streak_at(now);
        u.streak_days = streak;
        u.last_login_at = Some(now);
        Ok(u.clone())
    }

    fn commit_completion(
        &self,
        habit: &Habit,
        completion: &HabitCompletion,
    ) -> StoreResult<CompletionCommit> {
        let mut state = self.lock()?;
        let day_key = (completion.habit_id, calendar_day(completion.completed_at));
        if state.completion_days.contains(&day_key) {
            return Ok(CompletionCommit::AlreadyCompletedToday);
        }
        if !state.version_matches(habit)? {
            return Ok(CompletionCommit::Conflict);
        }
        // Validate the owner before mutating anything
        state.user_mut(completion.user_id)?;

        let stored = state.write_habit(habit);
        state.completion_days.insert(day_key);
        state.completions.push(completion.clone());
        let balance = state.credit(completion.user_id, completion.points_awarded)?;

        Ok(CompletionCommit::Committed {
            habit: stored,
            balance,
        })
    }

    fn write_habit(&self, habit: &Habit) -> StoreResult<HabitWrite> {
        let mut state = self.lock()?;
        if !state.version_matches(habit)? {
            return Ok(HabitWrite::Conflict);
        }
        Ok(HabitWrite::Written(state.write_habit(habit)))
    }

    fn commit_freeze_purchase(&self, habit: &Habit, cost: u64) -> StoreResult<PurchaseCommit> {
        let mut state = self.lock()?;
        if !state.version_matches(habit)? {
            return Ok(PurchaseCommit::Conflict);
        }
        let user = state.user_mut(habit.user_id)?;
        if user.points < cost {
            return Ok(PurchaseCommit::InsufficientPoints { have: user.points });
        }
        user.points -= cost;
        let totals = user.totals();
        let stored = state.write_habit(habit);
        Ok(PurchaseCommit::Committed {
            habit: stored,
            totals,
        })
    }

    fn unlock_achievement(
        &self,
        unlock: &UserAchievement,
        reward: u64,
    ) -> StoreResult<Option<BalanceChange>> {
        let mut state = self.lock()?;
        let key = (unlock.user_id, unlock.achievement_id.clone());
        if state.achievements.contains_key(&key) {
            return Ok(None);
        }
        let balance = state.credit(unlock.user_id, reward)?;
        state.achievements.insert(key, unlock.clone());
        Ok(Some(balance))
    }
}
