//! TOML-based engine configuration.
//!
//! Stores the tunable policy surface:
//! - Score deltas and the initial value
//! - Lockout threshold and duration
//! - Proof artifact limits
//! - Quiet hours for notification decisions
//! - Decay cadence
//!
//! Configuration is stored at `~/.config/oathkeeper/config.toml`.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;
use crate::lockout::LockoutPolicy;
use crate::notify::QuietHoursPolicy;
use crate::proof::ProofPolicy;
use crate::score::ScoreWeights;

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/oathkeeper/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hours of inactivity per self-heal decay tick.
    ///
    /// Kept ahead of the sections so the TOML serializer emits it before
    /// the first table header.
    #[serde(default = "default_decay_interval_hours")]
    pub decay_interval_hours: i64,
    #[serde(default)]
    pub score: ScoreWeights,
    #[serde(default)]
    pub lockout: LockoutPolicy,
    #[serde(default)]
    pub proof: ProofPolicy,
    #[serde(default)]
    pub quiet_hours: QuietHoursPolicy,
}

fn default_decay_interval_hours() -> i64 {
    24
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decay_interval_hours: default_decay_interval_hours(),
            score: ScoreWeights::default(),
            lockout: LockoutPolicy::default(),
            proof: ProofPolicy::default(),
            quiet_hours: QuietHoursPolicy::default(),
        }
    }
}

impl Config {
    pub fn decay_interval(&self) -> Duration {
        Duration::hours(self.decay_interval_hours)
    }

    /// Path of the configuration file inside the data directory.
    pub fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Save configuration to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path().map_err(|e| ConfigError::SaveFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }
}
