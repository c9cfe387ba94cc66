//! TOML configuration for the engine and its server.
//!
//! Every section and field has a default, so an empty file is a valid
//! config. Missing sections fall back to their defaults independently.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::achievements::default_catalog;
use crate::combo::ComboConfig;
use crate::habits::HabitConfig;
use crate::rewards::ClickConfig;
use crate::types::Achievement;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML did not parse
    #[error("parse error: {0}")]
    Parse(String),
    /// Values parse but do not make sense together
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP port (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory for the sled database (default: ~/.streakforge)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Capacity of the notification queue
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".streakforge")
}

fn default_event_queue() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            event_queue: default_event_queue(),
        }
    }
}

/// Complete engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seed for reward rolls; entropy when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
    /// Combo window
    #[serde(default)]
    pub combo: ComboConfig,
    /// Click rewards
    #[serde(default)]
    pub click: ClickConfig,
    /// Habit rewards and freezes
    #[serde(default)]
    pub habits: HabitConfig,
    /// Achievement catalog
    #[serde(default = "default_catalog")]
    pub achievements: Vec<Achievement>,
    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            combo: ComboConfig::default(),
            click: ClickConfig::default(),
            habits: HabitConfig::default(),
            achievements: default_catalog(),
            server: ServerConfig::default(),
        }
    }
}

fn check(ok: bool, msg: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid(msg()))
    }
}

fn is_probability(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

impl EngineConfig {
    /// Parse a TOML string and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save config to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject values that cannot work together
    pub fn validate(&self) -> Result<(), ConfigError> {
        let combo = &self.combo;
        check(combo.min_gap_ms >= 0, || "combo.min_gap_ms is negative".into())?;
        check(combo.min_gap_ms <= combo.max_gap_ms, || {
            format!(
                "combo.min_gap_ms ({}) above combo.max_gap_ms ({})",
                combo.min_gap_ms, combo.max_gap_ms
            )
        })?;
        check(combo.idle_timeout_ms > combo.max_gap_ms, || {
            "combo.idle_timeout_ms must exceed combo.max_gap_ms".into()
        })?;
        check(combo.sweep_interval_ms > 0, || "combo.sweep_interval_ms is zero".into())?;

        let click = &self.click;
        check(click.daily_milestone > 0, || "click.daily_milestone is zero".into())?;
        check(is_probability(click.lucky_chance), || {
            format!("click.lucky_chance {} outside [0, 1]", click.lucky_chance)
        })?;
        check(click.lucky_multiplier >= 1, || "click.lucky_multiplier below 1".into())?;

        let habits = &self.habits;
        check(habits.critical_multiplier >= 1, || {
            "habits.critical_multiplier below 1".into()
        })?;
        let chances = &habits.critical_chances;
        for (name, p) in [
            ("easy", chances.easy),
            ("medium", chances.medium),
            ("hard", chances.hard),
            ("very_hard", chances.very_hard),
            ("epic", chances.epic),
        ] {
            check(is_probability(p), || {
                format!("habits.critical_chances.{name} {p} outside [0, 1]")
            })?;
        }
        check(habits.max_freezes >= 1, || "habits.max_freezes is zero".into())?;

        let mut seen = std::collections::HashSet::new();
        for achievement in &self.achievements {
            check(seen.insert(achievement.id.as_str()), || {
                format!("duplicate achievement id {}", achievement.id)
            })?;
        }
        Ok(())
    }
}

/// Config written by `streakforge config`
#[must_use]
pub fn default_toml() -> String {
    EngineConfig::default()
        .to_toml()
        .unwrap_or_else(|e| format!("# failed to render default config: {e}\n"))
}
