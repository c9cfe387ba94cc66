//! Deterministic leaderboard ranking.
//!
//! Ranking is a total order: metric value descending, then user id
//! ascending. Ranks are 1-based positions in that order, so identical input
//! always yields identical output. Windowed boards rank pre-filtered
//! snapshots; building those is the store's concern.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::progression::LevelCalculator;
use crate::types::{Timestamp, User, UserId, DAY_MS};

/// What a leaderboard is ranked by
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardMetric {
    /// Spendable balance
    Points,
    /// Click counter
    Clicks,
    /// Lifetime earned points
    LifetimePoints,
    /// Level number
    Level,
}

impl FromStr for LeaderboardMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "points" => Ok(Self::Points),
            "clicks" => Ok(Self::Clicks),
            "lifetime_points" | "lifetime" => Ok(Self::LifetimePoints),
            "level" => Ok(Self::Level),
            other => Err(format!("unknown leaderboard metric: {other}")),
        }
    }
}

/// Time window a leaderboard covers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardWindow {
    /// Everything
    AllTime,
    /// Last 7 days
    Weekly,
    /// Last 30 days
    Monthly,
}

impl LeaderboardWindow {
    /// Start of the window, `None` for all-time
    #[must_use]
    pub fn since(self, now: Timestamp) -> Option<Timestamp> {
        match self {
            Self::AllTime => None,
            Self::Weekly => Some(now - 7 * DAY_MS),
            Self::Monthly => Some(now - 30 * DAY_MS),
        }
    }
}

impl FromStr for LeaderboardWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all_time" | "all" => Ok(Self::AllTime),
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            other => Err(format!("unknown leaderboard window: {other}")),
        }
    }
}

impl fmt::Display for LeaderboardWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllTime => "all_time",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        })
    }
}

/// One user's counters as seen by a leaderboard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// User
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Spendable balance (or points earned inside the window)
    pub points: u64,
    /// Click counter
    pub clicks: u64,
    /// Lifetime points (or points earned inside the window)
    pub lifetime_points: u64,
    /// Level number
    pub level: u32,
}

impl UserSnapshot {
    /// All-time snapshot of a user
    #[must_use]
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            name: user.name.clone(),
            points: user.points,
            clicks: user.clicks,
            lifetime_points: user.lifetime_points,
            level: LevelCalculator::for_points(user.lifetime_points).level,
        }
    }

    /// Value of `metric` for this user
    #[must_use]
    pub fn value(&self, metric: LeaderboardMetric) -> u64 {
        match metric {
            LeaderboardMetric::Points => self.points,
            LeaderboardMetric::Clicks => self.clicks,
            LeaderboardMetric::LifetimePoints => self.lifetime_points,
            LeaderboardMetric::Level => u64::from(self.level),
        }
    }
}

/// A ranked leaderboard row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// 1-based position
    pub rank: u32,
    /// User
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Metric value
    pub value: u64,
    /// Level number
    pub level: u32,
}

/// Orders snapshots by a metric
#[derive(Clone, Copy, Debug, Default)]
pub struct LeaderboardRanker;

impl LeaderboardRanker {
    /// Rank `snapshots` by `metric`, keeping the first `limit` rows
    #[must_use]
    pub fn rank(
        snapshots: &[UserSnapshot],
        metric: LeaderboardMetric,
        limit: Option<usize>,
    ) -> Vec<RankedEntry> {
        let mut ordered: Vec<&UserSnapshot> = snapshots.iter().collect();
        ordered.sort_by(|a, b| {
            b.value(metric)
                .cmp(&a.value(metric))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        ordered
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .enumerate()
            .map(|(i, s)| RankedEntry {
                rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
                user_id: s.user_id,
                name: s.name.clone(),
                value: s.value(metric),
                level: s.level,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snap(id: u64, points: u64) -> UserSnapshot {
        UserSnapshot {
            user_id: UserId::new(id),
            name: format!("u{id}"),
            points,
            clicks: 0,
            lifetime_points: points,
            level: LevelCalculator::for_points(points).level,
        }
    }

    #[test]
    fn test_tie_broken_by_user_id() {
        let snapshots = vec![snap(3, 50), snap(2, 100), snap(1, 100)];
        let ranked = LeaderboardRanker::rank(&snapshots, LeaderboardMetric::Points, None);
        let order: Vec<(u64, u32)> = ranked.iter().map(|e| (e.user_id.raw(), e.rank)).collect();
        assert_eq!(order, vec![(1, 1), (2, 2), (3, 3)]);

        // Stable across calls
        assert_eq!(
            ranked,
            LeaderboardRanker::rank(&snapshots, LeaderboardMetric::Points, None)
        );
    }

    #[test]
    fn test_limit_and_metric() {
        let mut a = snap(1, 10);
        a.clicks = 500;
        let b = snap(2, 1_000);
        let ranked = LeaderboardRanker::rank(&[a, b], LeaderboardMetric::Clicks, Some(1));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].user_id, UserId::new(1));
        assert_eq!(ranked[0].value, 500);
    }

    #[test]
    fn test_level_metric() {
        let ranked = LeaderboardRanker::rank(
            &[snap(1, 99), snap(2, 5_000)],
            LeaderboardMetric::Level,
            None,
        );
        assert_eq!(ranked[0].user_id, UserId::new(2));
        assert_eq!(ranked[0].value, 5);
    }

    #[test]
    fn test_window_bounds() {
        let now = 100 * DAY_MS;
        assert_eq!(LeaderboardWindow::AllTime.since(now), None);
        assert_eq!(LeaderboardWindow::Weekly.since(now), Some(93 * DAY_MS));
        assert_eq!(LeaderboardWindow::Monthly.since(now), Some(70 * DAY_MS));
        assert_eq!("week".parse::<LeaderboardWindow>().unwrap(), LeaderboardWindow::Weekly);
        assert!("yearly".parse::<LeaderboardWindow>().is_err());
    }

    proptest! {
        #[test]
        fn prop_ranking_independent_of_input_order(points in proptest::collection::vec(0u64..5, 1..30)) {
            let snapshots: Vec<UserSnapshot> = points
                .iter()
                .enumerate()
                .map(|(i, p)| snap(i as u64, *p))
                .collect();
            let mut reversed = snapshots.clone();
            reversed.reverse();

            let a = LeaderboardRanker::rank(&snapshots, LeaderboardMetric::Points, None);
            let b = LeaderboardRanker::rank(&reversed, LeaderboardMetric::Points, None);
            prop_assert_eq!(&a, &b);
            for pair in a.windows(2) {
                prop_assert!(pair[0].value >= pair[1].value);
                prop_assert_eq!(pair[0].rank + 1, pair[1].rank);
            }
        }
    }
}
