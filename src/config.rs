//! Engine configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Timing and retention settings shared by every match a scheduler runs.
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct EngineConfig {
    /// Ticks per second each match is driven at.
    #[serde(default = "default_tick_rate")]
    tick_rate: u32,

    /// Seconds a match may sit with nobody connected or joining.
    #[serde(default = "default_max_empty_sec")]
    max_empty_sec: u32,

    /// Turn budget in timed mode.
    #[serde(default = "default_turn_time_timed_sec")]
    turn_time_timed_sec: u32,

    /// Turn budget in untimed mode; pinned so it never runs out.
    #[serde(default = "default_untimed_turn_sec")]
    untimed_turn_sec: u32,

    /// Game history entries kept per player by the stats store.
    #[serde(default = "default_history_limit")]
    history_limit: u32,
}

fn default_tick_rate() -> u32 {
    5
}

fn default_max_empty_sec() -> u32 {
    30
}

fn default_turn_time_timed_sec() -> u32 {
    30
}

fn default_untimed_turn_sec() -> u32 {
    3600
}

fn default_history_limit() -> u32 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            max_empty_sec: default_max_empty_sec(),
            turn_time_timed_sec: default_turn_time_timed_sec(),
            untimed_turn_sec: default_untimed_turn_sec(),
            history_limit: default_history_limit(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading engine config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        info!(
            tick_rate = config.tick_rate,
            max_empty_sec = config.max_empty_sec,
            turn_time_timed_sec = config.turn_time_timed_sec,
            "Engine config loaded"
        );
        Ok(config)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::new(format!(
                "tick_rate must be between 1 and 1000, got {}",
                self.tick_rate
            )));
        }
        if self.turn_time_timed_sec == 0 {
            return Err(ConfigError::new("turn_time_timed_sec must be positive"));
        }
        if self.untimed_turn_sec == 0 {
            return Err(ConfigError::new("untimed_turn_sec must be positive"));
        }
        Ok(())
    }

    /// Idle ticks after which an empty match is closed.
    pub fn max_empty_ticks(&self) -> u32 {
        self.max_empty_sec.saturating_mul(self.tick_rate)
    }

    /// Turn budget in ticks for the given mode.
    pub fn deadline_ticks(&self, timed: bool) -> i64 {
        let secs = if timed {
            self.turn_time_timed_sec
        } else {
            self.untimed_turn_sec
        };
        i64::from(secs) * i64::from(self.tick_rate)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
