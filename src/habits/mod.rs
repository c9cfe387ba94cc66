//! Habit streaks, freezes and critical-success rewards.
//!
//! The [`HabitStreakEngine`] is a pure state machine over [`Habit`]: it
//! checks preconditions and computes the next habit state and reward, but
//! never touches storage. Persisting a transition is the caller's job.
//!
//! States relative to a day: `Idle`, `CompletedToday`, `Frozen`.
//! - complete: `Idle | Frozen -> CompletedToday`, clears the freeze
//! - use_freeze: `Idle -> Frozen`, consumes a token
//! - buy_freeze: adds a token, state unchanged

pub mod streak;

use serde::{Deserialize, Serialize};

use crate::rewards::CriticalChances;

pub use streak::{CompletionTransition, FreezePurchase, HabitStreakEngine};

/// Habit reward and freeze configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HabitConfig {
    /// Whole multiplier for a critical success
    #[serde(default = "default_critical_multiplier")]
    pub critical_multiplier: u32,
    /// Critical chance per difficulty
    #[serde(default)]
    pub critical_chances: CriticalChances,
    /// Price of one freeze token, in spendable points
    #[serde(default = "default_freeze_cost")]
    pub freeze_cost: u64,
    /// Most freeze tokens a habit can hold
    #[serde(default = "default_max_freezes")]
    pub max_freezes: u8,
}

fn default_critical_multiplier() -> u32 {
    2
}

fn default_freeze_cost() -> u64 {
    100
}

fn default_max_freezes() -> u8 {
    1
}

impl Default for HabitConfig {
    fn default() -> Self {
        Self {
            critical_multiplier: default_critical_multiplier(),
            critical_chances: CriticalChances::default(),
            freeze_cost: default_freeze_cost(),
            max_freezes: default_max_freezes(),
        }
    }
}

/// Habit precondition failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HabitError {
    /// The habit already has a completion on this calendar day
    #[error("habit already completed today")]
    AlreadyCompletedToday,
    /// No freeze token to use
    #[error("no freeze available")]
    NoFreezeAvailable,
    /// A freeze is already active
    #[error("habit is already frozen")]
    NotNeeded,
    /// Not enough spendable points
    #[error("insufficient points: need {need}, have {have}")]
    InsufficientPoints {
        /// Price
        need: u64,
        /// Balance
        have: u64,
    },
    /// Freeze token cap reached
    #[error("freeze already owned")]
    FreezeAlreadyOwned,
}
