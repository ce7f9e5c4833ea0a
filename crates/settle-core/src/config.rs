use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound for `stall_after_ms`: one day.
const MAX_STALL_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Prefix for log lines from this scheduler.
    pub name: String,
    /// How long a key may stay pending before `check_stalls` reports it.
    /// `0` turns stall reporting off.
    pub stall_after_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "settle".to_string(),
            stall_after_ms: 30_000,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stall_after_ms > MAX_STALL_MS {
            return Err(ConfigError::InvalidThreshold(self.stall_after_ms));
        }
        Ok(())
    }

    pub fn stall_after(&self) -> Option<Duration> {
        (self.stall_after_ms > 0).then(|| Duration::from_millis(self.stall_after_ms))
    }
}
