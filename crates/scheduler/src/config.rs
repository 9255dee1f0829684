//! Scheduler configuration, typically parsed from TOML.

use crate::error::{SchedulerError, MAX_SLICE_RATE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Host timing configuration
///
/// ```
/// use cadence_scheduler::SchedulerConfig;
///
/// let config = SchedulerConfig::from_toml_str("target_slice_rate = 60").unwrap();
/// assert_eq!(config.yield_interval_ms, 5);
/// assert_eq!(config.target_slice_rate, Some(60));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Slice length in milliseconds.
    #[serde(default = "default_yield_interval")]
    pub yield_interval_ms: u64,
    /// Cap on running past the slice deadline, in milliseconds.
    #[serde(default = "default_max_yield_interval")]
    pub max_yield_interval_ms: u64,
    /// Target slices per second; overrides `yield_interval_ms` when set.
    #[serde(default)]
    pub target_slice_rate: Option<u32>,
    /// Consult pending input and paint requests once past the deadline.
    #[serde(default)]
    pub pressure_aware: bool,
}

fn default_yield_interval() -> u64 {
    5
}

fn default_max_yield_interval() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            yield_interval_ms: default_yield_interval(),
            max_yield_interval_ms: default_max_yield_interval(),
            target_slice_rate: None,
            pressure_aware: false,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, SchedulerError> {
        let config: SchedulerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.yield_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "yield_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_yield_interval_ms < self.yield_interval_ms {
            return Err(SchedulerError::InvalidConfig(format!(
                "max_yield_interval_ms ({}) is shorter than yield_interval_ms ({})",
                self.max_yield_interval_ms, self.yield_interval_ms
            )));
        }
        if let Some(rate) = self.target_slice_rate {
            if rate > MAX_SLICE_RATE {
                return Err(SchedulerError::InvalidSliceRate { rate });
            }
        }
        Ok(())
    }

    /// Slice length as a duration.
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_interval_ms)
    }

    /// Overrun cap as a duration.
    pub fn max_yield_interval(&self) -> Duration {
        Duration::from_millis(self.max_yield_interval_ms)
    }
}
