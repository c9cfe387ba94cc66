//! # Streakforge
//!
//! Reward & progression engine for a gamified habit app.
//!
//! ## Architecture
//!
//! Pure components, leaves first:
//! - **progression**: lifetime points to level tier and multipliers
//! - **combo**: per-user chains of rapid actions (ephemeral, evicted when idle)
//! - **rewards**: click and ad rewards, the named odds table
//! - **habits**: streak, freeze and critical-success state machine
//! - **achievements**: unlock conditions over user aggregates
//! - **leaderboard**: deterministic ranking by a selected metric
//!
//! [`engine::RewardEngine`] composes them over a [`store::RewardStore`],
//! where every mutation is one atomic unit, and hands level-up and
//! achievement events to an [`events::EventDispatcher`] after commit.
//!
//! ## Randomness
//!
//! Lucky and critical rolls draw from an `Rng` passed into each operation,
//! so callers control seeding and tests can force either branch.

#![forbid(unsafe_code)]
#![deny(clippy::all, rust_2018_idioms)]
#![warn(clippy::pedantic, clippy::nursery, missing_docs)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::future_not_send,
    clippy::too_many_lines,
    // Point amounts and counters are bounded well below the cast limits
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    // Const fn not always beneficial for complex types
    clippy::missing_const_for_fn,
    // Self methods kept for API consistency even if unused
    clippy::unused_self,
    // must_use on every fn is excessive
    clippy::must_use_candidate,
    // Pass by value is fine for small Copy types
    clippy::needless_pass_by_value,
    // Field naming matches domain terminology
    clippy::struct_field_names,
    // Match arms with same body are sometimes clearer separate
    clippy::match_same_arms
)]

pub mod achievements;
pub mod api;
pub mod combo;
pub mod config;
pub mod engine;
pub mod events;
pub mod habits;
pub mod leaderboard;
pub mod progression;
pub mod rewards;
pub mod store;
pub mod types;

pub use achievements::{AchievementEvaluator, UserAggregates};
pub use combo::{ComboConfig, ComboStatus, ComboTracker};
pub use config::{ConfigError, EngineConfig};
pub use engine::{
    ClickOutcome, CompletionOutcome, EngineError, EngineResult, RewardEngine,
};
pub use events::{DispatchError, EngineEvent, EventDispatcher};
pub use habits::{HabitConfig, HabitError, HabitStreakEngine};
pub use leaderboard::{LeaderboardMetric, LeaderboardRanker, LeaderboardWindow, RankedEntry};
pub use progression::{Level, LevelCalculator, LevelUp, Multiplier};
pub use rewards::{ClickRewardCalculator, OddsTable, RiskPenalty};
pub use store::{MemoryStore, RewardStore, SledStore, StoreError};
pub use types::{Difficulty, Habit, HabitId, Timestamp, User, UserId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
