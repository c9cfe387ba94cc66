//! sled-backed store.
//!
//! One tree per table, values in bincode. Multi-row units run as sled
//! transactions over the trees they touch, so a failed unit leaves nothing
//! behind.
//!
//! Keys:
//! - `users`: user id
//! - `habits`: habit id
//! - `user_habits`: user id ++ habit id -> empty (ownership index)
//! - `completions`: habit id ++ day ++ user id
//! - `completion_counts`: user id -> u64
//! - `daily_actions`: user id -> latest day and its action count
//! - `achievements`: user id ++ achievement id

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    abort, ConflictableTransactionError, TransactionError, TransactionalTree, Transactional,
};
use sled::{Db, Tree};
use tracing::info;

use super::{
    BalanceChange, ClickCommit, CompletionCommit, DailyActions, HabitWrite, PurchaseCommit,
    RewardStore, StoreError, StoreResult,
};
use crate::leaderboard::UserSnapshot;
use crate::types::{
    calendar_day, Habit, HabitCompletion, HabitId, Timestamp, User, UserAchievement, UserId,
};

type TxResult<T> = Result<T, ConflictableTransactionError<StoreError>>;

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn tx_encode<T: Serialize>(value: &T) -> TxResult<Vec<u8>> {
    encode(value).map_err(ConflictableTransactionError::Abort)
}

fn tx_decode<T: DeserializeOwned>(bytes: &[u8]) -> TxResult<T> {
    decode(bytes).map_err(ConflictableTransactionError::Abort)
}

fn from_tx(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Database(e),
    }
}

fn day_bytes(day: NaiveDate) -> [u8; 4] {
    day.num_days_from_ce().to_be_bytes()
}

fn completion_key(habit: HabitId, day: NaiveDate, user: UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(20);
    key.extend_from_slice(&habit.to_be_bytes());
    key.extend_from_slice(&day_bytes(day));
    key.extend_from_slice(&user.to_be_bytes());
    key
}

fn completion_day_prefix(habit: HabitId, day: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&habit.to_be_bytes());
    key.extend_from_slice(&day_bytes(day));
    key
}

fn user_habit_key(user: UserId, habit: HabitId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&user.to_be_bytes());
    key.extend_from_slice(&habit.to_be_bytes());
    key
}

fn habit_from_index(key: &[u8]) -> StoreResult<HabitId> {
    key.get(8..16)
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(|b| HabitId::new(u64::from_be_bytes(b)))
        .ok_or_else(|| StoreError::Serialization("malformed habit index key".into()))
}

fn achievement_key(user: UserId, achievement_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + achievement_id.len());
    key.extend_from_slice(&user.to_be_bytes());
    key.extend_from_slice(achievement_id.as_bytes());
    key
}

fn read_counter(bytes: Option<&[u8]>) -> u64 {
    bytes
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map_or(0, u64::from_be_bytes)
}

/// Credit a user inside a transaction
fn tx_credit(users: &TransactionalTree, user: UserId, amount: u64) -> TxResult<BalanceChange> {
    let key = user.to_be_bytes();
    let Some(bytes) = users.get(key)? else {
        return abort(StoreError::Missing(format!("user {user}")));
    };
    let mut row: User = tx_decode(&bytes)?;
    let before = row.totals();
    row.points = row.points.saturating_add(amount);
    row.lifetime_points = row.lifetime_points.saturating_add(amount);
    users.insert(&key[..], tx_encode(&row)?)?;
    Ok(BalanceChange {
        before,
        after: row.totals(),
    })
}

/// Version check inside a transaction; `Ok(false)` on mismatch
fn tx_version_matches(habits: &TransactionalTree, habit: &Habit) -> TxResult<bool> {
    let Some(bytes) = habits.get(habit.id.to_be_bytes())? else {
        return abort(StoreError::Missing(format!("habit {}", habit.id)));
    };
    let stored: Habit = tx_decode(&bytes)?;
    Ok(stored.version == habit.version)
}

fn tx_write_habit(habits: &TransactionalTree, habit: &Habit) -> TxResult<Habit> {
    let mut stored = habit.clone();
    stored.version += 1;
    habits.insert(&habit.id.to_be_bytes()[..], tx_encode(&stored)?)?;
    Ok(stored)
}

/// Store persisted in a sled database
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    users: Tree,
    habits: Tree,
    user_habits: Tree,
    completions: Tree,
    completion_counts: Tree,
    daily_actions: Tree,
    achievements: Tree,
}

impl SledStore {
    /// Open (or create) a database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = sled::open(path)?;
        info!(path = %path.display(), "opened reward store");
        Self::from_db(db)
    }

    /// Database that lives only as long as the process
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            habits: db.open_tree("habits")?,
            user_habits: db.open_tree("user_habits")?,
            completions: db.open_tree("completions")?,
            completion_counts: db.open_tree("completion_counts")?,
            daily_actions: db.open_tree("daily_actions")?,
            achievements: db.open_tree("achievements")?,
            db,
        })
    }

    /// Flush dirty pages to disk
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn insert_new<T: Serialize>(tree: &Tree, key: [u8; 8], value: &T, what: String) -> StoreResult<()> {
        let bytes = encode(value)?;
        tree.compare_and_swap(key, None::<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::Duplicate(what))
    }

    fn completions_since(&self, since: Timestamp) -> StoreResult<HashMap<UserId, u64>> {
        let mut earned = HashMap::new();
        for entry in self.completions.iter() {
            let (_, bytes) = entry?;
            let completion: HabitCompletion = decode(&bytes)?;
            if completion.completed_at >= since {
                *earned.entry(completion.user_id).or_insert(0) += completion.points_awarded;
            }
        }
        Ok(earned)
    }
}

impl RewardStore for SledStore {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        Self::insert_new(&self.users, user.id.to_be_bytes(), user, format!("user {}", user.id))
    }

    fn insert_habit(&self, habit: &Habit) -> StoreResult<()> {
        let key = habit.id.to_be_bytes();
        let index = user_habit_key(habit.user_id, habit.id);
        (&self.habits, &self.user_habits)
            .transaction(|(habits, owners)| {
                if habits.get(key)?.is_some() {
                    return abort(StoreError::Duplicate(format!("habit {}", habit.id)));
                }
                habits.insert(&key[..], tx_encode(habit)?)?;
                owners.insert(index.as_slice(), Vec::<u8>::new())?;
                Ok(())
            })
            .map_err(from_tx)
    }

    fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.users
            .get(id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn habit(&self, id: HabitId) -> StoreResult<Option<Habit>> {
        self.habits
            .get(id.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn habits_for_user(&self, user: UserId) -> StoreResult<Vec<Habit>> {
        let mut habits = Vec::new();
        for entry in self.user_habits.scan_prefix(user.to_be_bytes()) {
            let (key, _) = entry?;
            let id = habit_from_index(&key)?;
            if let Some(habit) = self.habit(id)? {
                habits.push(habit);
            }
        }
        Ok(habits)
    }

    fn completion_exists(&self, habit: HabitId, day: NaiveDate) -> StoreResult<bool> {
        let prefix = completion_day_prefix(habit, day);
        Ok(self.completions.scan_prefix(prefix).next().transpose()?.is_some())
    }

    fn completion_count(&self, user: UserId) -> StoreResult<u64> {
        let bytes = self.completion_counts.get(user.to_be_bytes())?;
        Ok(read_counter(bytes.as_deref()))
    }

    fn unlocked_achievements(&self, user: UserId) -> StoreResult<HashSet<String>> {
        let mut unlocked = HashSet::new();
        for entry in self.achievements.scan_prefix(user.to_be_bytes()) {
            let (_, bytes) = entry?;
            let row: UserAchievement = decode(&bytes)?;
            unlocked.insert(row.achievement_id);
        }
        Ok(unlocked)
    }

    fn snapshots(&self, since: Option<Timestamp>) -> StoreResult<Vec<UserSnapshot>> {
        let earned = since.map(|s| self.completions_since(s)).transpose()?;
        let mut snapshots = Vec::new();
        for entry in self.users.iter() {
            let (_, bytes) = entry?;
            let user: User = decode(&bytes)?;
            let mut snapshot = UserSnapshot::from_user(&user);
            if let Some(earned) = &earned {
                let windowed = earned.get(&user.id).copied().unwrap_or(0);
                snapshot.points = windowed;
                snapshot.lifetime_points = windowed;
            }
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    fn credit(&self, user: UserId, amount: u64) -> StoreResult<BalanceChange> {
        self.users
            .transaction(|users| tx_credit(users, user, amount))
            .map_err(from_tx)
    }

    fn commit_click<T, F>(&self, user: UserId, day: NaiveDate, reward: F) -> StoreResult<ClickCommit<T>>
    where
        F: FnMut(u64) -> (u64, T),
    {
        // sled may rerun the closure on conflict
        let reward = RefCell::new(reward);
        (&self.users, &self.daily_actions)
            .transaction(|(users, daily)| {
                let key = user.to_be_bytes();
                let Some(bytes) = users.get(key)? else {
                    return abort(StoreError::Missing(format!("user {user}")));
                };
                let mut row: User = tx_decode(&bytes)?;

                let current = daily
                    .get(key)?
                    .map(|b| tx_decode::<DailyActions>(&b))
                    .transpose()?;
                let actions = DailyActions::next(current, day);
                let (amount, value) = {
                    let mut compute = reward.borrow_mut();
                    (*compute)(actions.count)
                };

                row.clicks = row.clicks.saturating_add(1);
                let before = row.totals();
                row.points = row.points.saturating_add(amount);
                row.lifetime_points = row.lifetime_points.saturating_add(amount);
                users.insert(&key[..], tx_encode(&row)?)?;
                daily.insert(&key[..], tx_encode(&actions)?)?;

                Ok(ClickCommit {
                    actions_today: actions.count,
                    reward: value,
                    balance: BalanceChange {
                        before,
                        after: row.totals(),
                    },
                })
            })
            .map_err(from_tx)
    }

    fn record_login(&self, user: UserId, now: Timestamp) -> StoreResult<User> {
        self.users
            .transaction(|users| {
                let key = user.to_be_bytes();
                let Some(bytes) = users.get(key)? else {
                    return abort(StoreError::Missing(format!("user {user}")));
                };
                let mut row: User = tx_decode(&bytes)?;
                let (streak, _) = row.login_streak_at(now);
                row.streak_days = streak;
                row.last_login_at = Some(now);
                users.insert(&key[..], tx_encode(&row)?)?;
                Ok(row)
            })
            .map_err(from_tx)
    }

    fn commit_completion(
        &self,
        habit: &Habit,
        completion: &HabitCompletion,
    ) -> StoreResult<CompletionCommit> {
        let day = calendar_day(completion.completed_at);
        // Habits have a single owner, so the full key is unique per day.
        let key = completion_key(completion.habit_id, day, completion.user_id);

        (
            &self.users,
            &self.habits,
            &self.completions,
            &self.completion_counts,
        )
            .transaction(|(users, habits, completions, counts)| {
                if completions.get(&key)?.is_some() {
                    return Ok(CompletionCommit::AlreadyCompletedToday);
                }
                if !tx_version_matches(habits, habit)? {
                    return Ok(CompletionCommit::Conflict);
                }

                let stored = tx_write_habit(habits, habit)?;
                completions.insert(key.as_slice(), tx_encode(completion)?)?;

                let count_key = completion.user_id.to_be_bytes();
                let count = read_counter(counts.get(count_key)?.as_deref()) + 1;
                counts.insert(&count_key[..], count.to_be_bytes().to_vec())?;

                let balance = tx_credit(users, completion.user_id, completion.points_awarded)?;
                Ok(CompletionCommit::Committed {
                    habit: stored,
                    balance,
                })
            })
            .map_err(from_tx)
    }

    fn write_habit(&self, habit: &Habit) -> StoreResult<HabitWrite> {
        self.habits
            .transaction(|habits| {
                if !tx_version_matches(habits, habit)? {
                    return Ok(HabitWrite::Conflict);
                }
                Ok(HabitWrite::Written(tx_write_habit(habits, habit)?))
            })
            .map_err(from_tx)
    }

    fn commit_freeze_purchase(&self, habit: &Habit, cost: u64) -> StoreResult<PurchaseCommit> {
        (&self.users, &self.habits)
            .transaction(|(users, habits)| {
                if !tx_version_matches(habits, habit)? {
                    return Ok(PurchaseCommit::Conflict);
                }

                let key = habit.user_id.to_be_bytes();
                let Some(bytes) = users.get(key)? else {
                    return abort(StoreError::Missing(format!("user {}", habit.user_id)));
                };
                let mut row: User = tx_decode(&bytes)?;
                if row.points < cost {
                    return Ok(PurchaseCommit::InsufficientPoints { have: row.points });
                }
                row.points -= cost;
                users.insert(&key[..], tx_encode(&row)?)?;

                let stored = tx_write_habit(habits, habit)?;
                Ok(PurchaseCommit::Committed {
                    habit: stored,
                    totals: row.totals(),
                })
            })
            .map_err(from_tx)
    }

    fn unlock_achievement(
        &self,
        unlock: &UserAchievement,
        reward: u64,
    ) -> StoreResult<Option<BalanceChange>> {
        let key = achievement_key(unlock.user_id, &unlock.achievement_id);
        (&self.users, &self.achievements)
            .transaction(|(users, achievements)| {
                if achievements.get(&key)?.is_some() {
                    return Ok(None);
                }
                achievements.insert(key.as_slice(), tx_encode(unlock)?)?;
                Ok(Some(tx_credit(users, unlock.user_id, reward)?))
            })
            .map_err(from_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use crate::types::Difficulty;

    #[test]
    fn test_conformance() {
        conformance::run_all(|| SledStore::temporary().unwrap());
    }

    #[test]
    fn test_habits_for_user_uses_owner_index() {
        let store = SledStore::temporary().unwrap();
        let (ana, bob) = (UserId::new(1), UserId::new(2));
        for (id, owner) in [(7, bob), (3, ana), (5, ana)] {
            store
                .insert_habit(&Habit::new(HabitId::new(id), owner, "h", Difficulty::Easy))
                .unwrap();
        }
        let ids: Vec<HabitId> = store.habits_for_user(ana).unwrap().iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![HabitId::new(3), HabitId::new(5)]);
        assert_eq!(store.user_habits.len(), 3);
        assert!(matches!(
            store.insert_habit(&Habit::new(HabitId::new(3), bob, "h", Difficulty::Easy)),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.user_habits.len(), 3);
    }

    #[test]
    fn test_daily_actions_keep_one_row_per_user() {
        let store = SledStore::temporary().unwrap();
        store.insert_user(&User::new(UserId::new(1), "ana")).unwrap();
        for n in 0..5 {
            let day = calendar_day(n * crate::types::DAY_MS);
            store.commit_click(UserId::new(1), day, |_| (1, ())).unwrap();
        }
        assert_eq!(store.daily_actions.len(), 1);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = std::env::temp_dir().join(format!("streakforge-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        {
            let store = SledStore::open(&dir).unwrap();
            store.insert_user(&User::new(UserId::new(1), "ana")).unwrap();
            store
                .insert_habit(&Habit::new(HabitId::new(2), UserId::new(1), "walk", Difficulty::Hard))
                .unwrap();
            store.credit(UserId::new(1), 40).unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(&dir).unwrap();
        assert_eq!(store.user(UserId::new(1)).unwrap().unwrap().lifetime_points, 40);
        assert_eq!(
            store.habit(HabitId::new(2)).unwrap().unwrap().difficulty,
            Difficulty::Hard
        );
        drop(store);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
