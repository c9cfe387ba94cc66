//! Click rewards.
//!
//! Stages run in a fixed order and each floors to an integer before the next
//! multiplies: base schedule, level multiplier, combo bonus, lucky roll, risk
//! penalty. The daily milestone bonus is computed separately.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Odds, RiskPenalty};
use crate::combo::ComboStatus;
use crate::progression::{Level, Multiplier};

/// Click reward configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClickConfig {
    /// The Nth action of a day earns the daily bonus
    #[serde(default = "default_daily_milestone")]
    pub daily_milestone: u64,
    /// Daily bonus before the level multiplier
    #[serde(default = "default_daily_bonus_base")]
    pub daily_bonus_base: u64,
    /// Probability of a lucky click
    #[serde(default = "default_lucky_chance")]
    pub lucky_chance: f64,
    /// Whole multiplier applied on a lucky click
    #[serde(default = "default_lucky_multiplier")]
    pub lucky_multiplier: u32,
    /// Past this many actions in a day the base drops to 1
    #[serde(default = "default_daily_soft_cap")]
    pub daily_soft_cap: u64,
}

fn default_daily_milestone() -> u64 {
    100
}

fn default_daily_bonus_base() -> u64 {
    50
}

fn default_lucky_chance() -> f64 {
    0.01
}

fn default_lucky_multiplier() -> u32 {
    10
}

fn default_daily_soft_cap() -> u64 {
    1_000
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            daily_milestone: default_daily_milestone(),
            daily_bonus_base: default_daily_bonus_base(),
            lucky_chance: default_lucky_chance(),
            lucky_multiplier: default_lucky_multiplier(),
            daily_soft_cap: default_daily_soft_cap(),
        }
    }
}

impl ClickConfig {
    /// Lucky-click odds entry
    #[must_use]
    pub fn lucky_odds(&self) -> Odds {
        Odds::new(self.lucky_chance, Multiplier::whole(self.lucky_multiplier))
    }
}

/// Everything a click reward depends on
#[derive(Clone, Copy, Debug)]
pub struct ClickInput {
    /// Daily login streak
    pub streak_days: u32,
    /// Actions today, including this one
    pub actions_today: u64,
    /// Level derived from lifetime points
    pub level: Level,
    /// Combo state after registering this click
    pub combo: ComboStatus,
    /// External risk factor
    pub risk: RiskPenalty,
}

/// Outcome of one click
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickReward {
    /// Points for the click itself
    pub reward: u64,
    /// Daily milestone bonus (0 unless this was the milestone action)
    pub daily_bonus: u64,
    /// Whether the lucky roll hit
    pub is_lucky: bool,
    /// Multiplier applied by the lucky roll (1.00x when it missed)
    pub lucky_multiplier: Multiplier,
    /// Combo chain length
    pub combo_count: u32,
}

impl ClickReward {
    /// Click reward plus daily bonus
    #[must_use]
    pub fn total(&self) -> u64 {
        self.reward.saturating_add(self.daily_bonus)
    }
}

/// Computes click rewards
#[derive(Clone, Debug, Default)]
pub struct ClickRewardCalculator {
    config: ClickConfig,
}

impl ClickRewardCalculator {
    /// Create a calculator
    #[must_use]
    pub fn new(config: ClickConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ClickConfig {
        &self.config
    }

    /// Base reward from the login streak, bounded per action
    #[must_use]
    pub fn base_for_streak(&self, streak_days: u32, actions_today: u64) -> u64 {
        if actions_today > self.config.daily_soft_cap {
            return 1;
        }
        match streak_days {
            0..=2 => 1,
            3..=6 => 2,
            7..=13 => 3,
            14..=29 => 4,
            _ => 5,
        }
    }

    /// Compute the reward for one click, drawing the lucky roll from `rng`
    pub fn calculate<R: Rng + ?Sized>(&self, input: &ClickInput, rng: &mut R) -> ClickReward {
        let base = self.base_for_streak(input.streak_days, input.actions_today);
        self.calculate_from_base(base, input, rng)
    }

    /// Same as [`calculate`](Self::calculate) with an explicit base
    pub fn calculate_from_base<R: Rng + ?Sized>(
        &self,
        base: u64,
        input: &ClickInput,
        rng: &mut R,
    ) -> ClickReward {
        let mut total = input.level.click_multiplier.apply(base);

        if input.combo.bonus_eligible {
            let combo = Multiplier::from_hundredths(100 + input.level.combo_bonus);
            total = combo.apply(total);
        }

        let lucky = self.config.lucky_odds();
        let is_lucky = lucky.roll(rng);
        let lucky_multiplier = if is_lucky {
            total = lucky.multiplier.apply(total);
            lucky.multiplier
        } else {
            Multiplier::ONE
        };

        ClickReward {
            reward: input.risk.apply(total),
            daily_bonus: self.daily_bonus(input.actions_today, &input.level, input.risk),
            is_lucky,
            lucky_multiplier,
            combo_count: input.combo.combo_count,
        }
    }

    /// Daily milestone bonus, non-zero only on the milestone action itself
    #[must_use]
    pub fn daily_bonus(&self, actions_today: u64, level: &Level, risk: RiskPenalty) -> u64 {
        if actions_today != self.config.daily_milestone {
            return 0;
        }
        let scaled = level.daily_bonus_multiplier.apply(self.config.daily_bonus_base);
        risk.apply(scaled)
    }
}
