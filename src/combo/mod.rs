//! Per-user combo chains.
//!
//! A combo grows while consecutive actions land inside the continuation band
//! (`min_gap_ms..=max_gap_ms`). Anything faster is treated as automation and
//! anything slower breaks the chain; both reset the count to zero. State is
//! cache-tier only and may be lost on restart.
//!
//! The map is sharded (`DashMap`); the entry guard serializes
//! read-modify-write for a single user, so double-submits from several tabs
//! cannot lose updates. Idle users are evicted by [`ComboTracker::evict_idle`],
//! normally driven by the background [`sweeper`].

pub mod sweeper;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{Timestamp, UserId};

pub use sweeper::{spawn_sweeper, SweeperHandle};

/// Combo window configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboConfig {
    /// Gaps shorter than this are too fast to be human and reset the chain
    #[serde(default = "default_min_gap_ms")]
    pub min_gap_ms: i64,
    /// Gaps longer than this break the chain
    #[serde(default = "default_max_gap_ms")]
    pub max_gap_ms: i64,
    /// Chain length at which the level's combo bonus applies
    #[serde(default = "default_min_chain")]
    pub min_chain: u32,
    /// Entries idle for longer than this are evicted
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: i64,
    /// How often the background sweeper runs
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_min_gap_ms() -> i64 {
    50
}

fn default_max_gap_ms() -> i64 {
    3_000
}

fn default_min_chain() -> u32 {
    5
}

fn default_idle_timeout_ms() -> i64 {
    5 * 60 * 1000
}

fn default_sweep_interval_ms() -> u64 {
    60 * 1000
}

impl Default for ComboConfig {
    fn default() -> Self {
        Self {
            min_gap_ms: default_min_gap_ms(),
            max_gap_ms: default_max_gap_ms(),
            min_chain: default_min_chain(),
            idle_timeout_ms: default_idle_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// Result of registering an action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboStatus {
    /// Current chain length
    pub combo_count: u32,
    /// Whether the chain is long enough for the combo bonus
    pub bonus_eligible: bool,
}

/// Ephemeral per-user chain state
#[derive(Clone, Copy, Debug)]
struct ComboEntry {
    last_action_at: Timestamp,
    combo_count: u32,
}

/// Tracks combo chains for all active users
#[derive(Debug)]
pub struct ComboTracker {
    config: ComboConfig,
    entries: DashMap<UserId, ComboEntry>,
}

impl ComboTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new(config: ComboConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Tracker configuration
    #[must_use]
    pub fn config(&self) -> &ComboConfig {
        &self.config
    }

    /// Register an action by `user` at `now`
    pub fn register(&self, user: UserId, now: Timestamp) -> ComboStatus {
        let combo_count = match self.entries.entry(user) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let elapsed = now - entry.last_action_at;
                entry.combo_count = if self.continues_chain(elapsed) {
                    entry.combo_count.saturating_add(1)
                } else {
                    0
                };
                entry.last_action_at = now;
                entry.combo_count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ComboEntry {
                    last_action_at: now,
                    combo_count: 0,
                });
                0
            }
        };

        trace!(%user, combo_count, "combo registered");
        self.status(combo_count)
    }

    /// Current chain for a user without registering an action
    #[must_use]
    pub fn peek(&self, user: UserId) -> ComboStatus {
        let combo_count = self.entries.get(&user).map_or(0, |e| e.combo_count);
        self.status(combo_count)
    }

    /// Drop entries idle for longer than the configured timeout.
    /// Returns how many were removed.
    pub fn evict_idle(&self, now: Timestamp) -> usize {
        let before = self.entries.len();
        let timeout = self.config.idle_timeout_ms;
        self.entries
            .retain(|_, entry| now - entry.last_action_at <= timeout);
        before.saturating_sub(self.entries.len())
    }

    /// Number of users with live chain state
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.entries.len()
    }

    /// Forget every chain
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn continues_chain(&self, elapsed: i64) -> bool {
        (self.config.min_gap_ms..=self.config.max_gap_ms).contains(&elapsed)
    }

    fn status(&self, combo_count: u32) -> ComboStatus {
        ComboStatus {
            combo_count,
            bonus_eligible: combo_count >= self.config.min_chain,
        }
    }
}

impl Default for ComboTracker {
    fn default() -> Self {
        Self::new(ComboConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn user() -> UserId {
        UserId::new(7)
    }

    /// Register `n` actions spaced `gap` ms apart starting at `start`
    fn chain(tracker: &ComboTracker, start: Timestamp, gap: i64, n: u32) -> ComboStatus {
        let mut status = tracker.register(user(), start);
        for i in 1..n {
            status = tracker.register(user(), start + gap * i64::from(i));
        }
        status
    }

    #[test]
    fn test_first_action_starts_at_zero() {
        let tracker = ComboTracker::default();
        let status = tracker.register(user(), 1_000);
        assert_eq!(status.combo_count, 0);
        assert!(!status.bonus_eligible);
    }

    #[test]
    fn test_bonus_requires_min_chain() {
        let tracker = ComboTracker::default();
        // First action is 0, so 5 actions reach 4
        let status = chain(&tracker, 0, 500, 5);
        assert_eq!(status.combo_count, 4);
        assert!(!status.bonus_eligible);

        let status = tracker.register(user(), 5 * 500);
        assert_eq!(status.combo_count, 5);
        assert!(status.bonus_eligible);
    }

    #[test]
    fn test_slow_gap_resets() {
        let tracker = ComboTracker::default();
        let status = chain(&tracker, 0, 1_000, 8);
        assert_eq!(status.combo_count, 7);

        let status = tracker.register(user(), 7_000 + 3_001);
        assert_eq!(status.combo_count, 0);
    }

    #[test]
    fn test_too_fast_resets() {
        let tracker = ComboTracker::default();
        chain(&tracker, 0, 100, 6);
        let status = tracker.register(user(), 500 + 49);
        assert_eq!(status.combo_count, 0);
    }

    #[test]
    fn test_band_edges_are_inclusive() {
        let tracker = ComboTracker::default();
        tracker.register(user(), 0);
        assert_eq!(tracker.register(user(), 50).combo_count, 1);
        assert_eq!(tracker.register(user(), 3_050).combo_count, 2);
    }

    #[test]
    fn test_timestamp_overwritten_on_reset() {
        let tracker = ComboTracker::default();
        tracker.register(user(), 0);
        // Reset by a long gap, then the next action chains off the reset one
        assert_eq!(tracker.register(user(), 10_000).combo_count, 0);
        assert_eq!(tracker.register(user(), 10_500).combo_count, 1);
    }

    #[test]
    fn test_users_are_independent() {
        let tracker = ComboTracker::default();
        chain(&tracker, 0, 200, 6);
        assert_eq!(tracker.peek(UserId::new(8)).combo_count, 0);
        assert_eq!(tracker.peek(user()).combo_count, 5);
    }

    #[test]
    fn test_evict_idle() {
        let tracker = ComboTracker::default();
        tracker.register(UserId::new(1), 0);
        tracker.register(UserId::new(2), 250_000);
        assert_eq!(tracker.tracked_users(), 2);

        let removed = tracker.evict_idle(default_idle_timeout_ms() + 1);
        assert_eq!(removed, 1);
        assert_eq!(tracker.tracked_users(), 1);
        assert_eq!(tracker.peek(UserId::new(1)).combo_count, 0);
    }

    #[test]
    fn test_concurrent_registration_same_user() {
        let tracker = Arc::new(ComboTracker::default());
        tracker.register(user(), 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || tracker.register(user(), 100))
            })
            .collect();
        let mut counts: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap().combo_count).collect();
        counts.sort_unstable();

        // The first racer chains off t=0, the rest see a 0ms gap and reset
        assert_eq!(counts, vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(tracker.tracked_users(), 1);
    }
}
