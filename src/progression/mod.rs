//! Level tiers derived from lifetime points.
//!
//! Pure and total: any historical `lifetime_points` value maps to exactly one
//! tier, which is how level-ups are detected (compare the tier before and
//! after an award).

pub mod multiplier;

use serde::Serialize;

pub use multiplier::Multiplier;

/// A level tier and the bonuses it grants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Level {
    /// 1-based level number
    pub level: u32,
    /// Display name
    pub level_name: &'static str,
    /// Display icon
    pub level_icon: &'static str,
    /// Lifetime points needed to reach this tier
    pub min_points: u64,
    /// Applied to the click base reward
    pub click_multiplier: Multiplier,
    /// Applied to the daily milestone bonus
    pub daily_bonus_multiplier: Multiplier,
    /// Points for a rewarded-ad view
    pub ad_reward: u64,
    /// Combo bonus in percent, once a combo chain is eligible
    pub combo_bonus: u32,
}

const fn tier(
    level: u32,
    level_name: &'static str,
    level_icon: &'static str,
    min_points: u64,
    multiplier_hundredths: u32,
    ad_reward: u64,
    combo_bonus: u32,
) -> Level {
    Level {
        level,
        level_name,
        level_icon,
        min_points,
        click_multiplier: Multiplier::from_hundredths(multiplier_hundredths),
        daily_bonus_multiplier: Multiplier::from_hundredths(multiplier_hundredths),
        ad_reward,
        combo_bonus,
    }
}

/// All tiers, sorted by `min_points`
pub static LEVELS: &[Level] = &[
    tier(1, "Seedling", "🌱", 0, 100, 5, 10),
    tier(2, "Sprout", "🌿", 100, 110, 6, 10),
    tier(3, "Sapling", "🌳", 500, 120, 8, 15),
    tier(4, "Explorer", "🧭", 1_500, 130, 10, 15),
    tier(5, "Adventurer", "⚔️", 5_000, 150, 12, 20),
    tier(6, "Champion", "🏆", 15_000, 175, 15, 25),
    tier(7, "Hero", "🦸", 50_000, 200, 20, 30),
    tier(8, "Legend", "🐉", 150_000, 250, 25, 40),
    tier(9, "Mythic", "🔮", 500_000, 300, 30, 50),
    tier(10, "Immortal", "👑", 1_000_000, 400, 40, 60),
];

/// A level increase caused by an award
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    /// Level before the award
    pub from: u32,
    /// Level after the award
    pub to: u32,
    /// Name of the new level
    pub level_name: &'static str,
}

/// Progress toward the next tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    /// Current tier
    pub current: Level,
    /// Threshold of the next tier (`None` at max level)
    pub next_threshold: Option<u64>,
    /// Points still needed for the next tier
    pub points_to_next: u64,
}

/// Maps lifetime points to level tiers
#[derive(Clone, Copy, Debug, Default)]
pub struct LevelCalculator;

impl LevelCalculator {
    /// Tier for a lifetime point total
    #[must_use]
    pub fn for_points(lifetime_points: u64) -> Level {
        let idx = LEVELS.partition_point(|l| l.min_points <= lifetime_points);
        // LEVELS[0].min_points is 0, so idx >= 1
        LEVELS[idx.saturating_sub(1)]
    }

    /// Level-up between two lifetime totals, if any
    #[must_use]
    pub fn level_up(before: u64, after: u64) -> Option<LevelUp> {
        let from = Self::for_points(before);
        let to = Self::for_points(after);
        (to.level > from.level).then_some(LevelUp {
            from: from.level,
            to: to.level,
            level_name: to.level_name,
        })
    }

    /// Progress toward the next tier
    #[must_use]
    pub fn progress(lifetime_points: u64) -> LevelProgress {
        let current = Self::for_points(lifetime_points);
        let next_threshold = LEVELS.get(current.level as usize).map(|l| l.min_points);
        LevelProgress {
            current,
            next_threshold,
            points_to_next: next_threshold.map_or(0, |t| t.saturating_sub(lifetime_points)),
        }
    }

    /// Highest level number
    #[must_use]
    pub fn max_level() -> u32 {
        LEVELS.len() as u32
    }
}
