//! Variable-reward probability tables.
//!
//! Every random bonus in the engine is one named [`Odds`] entry, so the
//! payout chances can be reviewed and tested as data.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ClickConfig;
use crate::habits::HabitConfig;
use crate::progression::Multiplier;
use crate::types::Difficulty;

/// Chance of a bonus firing and what it multiplies by
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    /// Probability in `[0, 1]`
    pub chance: f64,
    /// Applied to the reward when the roll hits
    pub multiplier: Multiplier,
}

impl Odds {
    /// Create an entry
    #[must_use]
    pub const fn new(chance: f64, multiplier: Multiplier) -> Self {
        Self { chance, multiplier }
    }

    /// Draw once from `rng`; hits when the uniform draw is below `chance`
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen::<f64>() < self.chance
    }
}

/// Critical-success chance per habit difficulty
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriticalChances {
    /// Easy habits
    #[serde(default = "default_easy")]
    pub easy: f64,
    /// Medium habits
    #[serde(default = "default_medium")]
    pub medium: f64,
    /// Hard habits
    #[serde(default = "default_hard")]
    pub hard: f64,
    /// Very hard habits
    #[serde(default = "default_very_hard")]
    pub very_hard: f64,
    /// Epic habits
    #[serde(default = "default_epic")]
    pub epic: f64,
}

fn default_easy() -> f64 {
    0.05
}

fn default_medium() -> f64 {
    0.08
}

fn default_hard() -> f64 {
    0.10
}

fn default_very_hard() -> f64 {
    0.12
}

fn default_epic() -> f64 {
    0.15
}

impl CriticalChances {
    /// Chance for one tier
    #[must_use]
    pub fn for_difficulty(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
            Difficulty::VeryHard => self.very_hard,
            Difficulty::Epic => self.epic,
        }
    }
}

impl Default for CriticalChances {
    fn default() -> Self {
        Self {
            easy: default_easy(),
            medium: default_medium(),
            hard: default_hard(),
            very_hard: default_very_hard(),
            epic: default_epic(),
        }
    }
}

/// All variable-reward odds used by the engine
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OddsTable {
    critical_chances: CriticalChances,
    critical_multiplier: Multiplier,
    lucky_click: Odds,
}

impl OddsTable {
    /// Build the table
    #[must_use]
    pub fn new(
        critical_chances: CriticalChances,
        critical_multiplier: Multiplier,
        lucky_click: Odds,
    ) -> Self {
        Self {
            critical_chances,
            critical_multiplier,
            lucky_click,
        }
    }

    /// Build the table from the click and habit configuration
    #[must_use]
    pub fn from_config(click: &ClickConfig, habits: &HabitConfig) -> Self {
        Self::new(
            habits.critical_chances.clone(),
            Multiplier::whole(habits.critical_multiplier),
            click.lucky_odds(),
        )
    }

    /// Critical-success odds for completing a habit
    #[must_use]
    pub fn critical(&self, difficulty: Difficulty) -> Odds {
        Odds::new(
            self.critical_chances.for_difficulty(difficulty),
            self.critical_multiplier,
        )
    }

    /// Lucky-click odds
    #[must_use]
    pub fn lucky_click(&self) -> Odds {
        self.lucky_click
    }

    /// Every entry with a stable name, for listing
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Odds)> {
        let mut out: Vec<(String, Odds)> = Difficulty::ALL
            .iter()
            .map(|d| (format!("critical_{d}"), self.critical(*d)))
            .collect();
        out.push(("lucky_click".to_string(), self.lucky_click));
        out
    }
}

impl Default for OddsTable {
    fn default() -> Self {
        Self::from_config(&ClickConfig::default(), &HabitConfig::default())
    }
}
