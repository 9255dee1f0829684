//! Time-slice budget for the work loop
//!
//! Each host continuation gets a slice of `yield_interval`. Once the slice
//! deadline passes the loop should hand control back so the host can process
//! input and paint.
//!
//! # Slice rates
//! - default: 5ms per slice
//! - `set_target_rate(n)`: `floor(1000 / n)` ms per slice, `n` in `1..=125`
//! - `set_target_rate(0)`: back to the default
//!
//! With pressure signals enabled the loop may keep going past the deadline
//! while there is no pending input or paint, up to `max_yield_interval`.

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, MAX_SLICE_RATE};
use std::time::Duration;
use tracing::{debug, error};

/// Default slice length (5ms)
pub const DEFAULT_YIELD_INTERVAL: Duration = Duration::from_millis(5);

/// Longest a pressure-aware slice may run past its start (300ms)
pub const MAX_YIELD_INTERVAL: Duration = Duration::from_millis(300);

/// Slice deadline tracker
///
/// # Example
///
/// ```
/// use cadence_scheduler::SliceBudget;
/// use std::time::Duration;
///
/// let mut budget = SliceBudget::new();
/// budget.begin_slice(Duration::from_millis(100));
///
/// assert!(!budget.should_yield(Duration::from_millis(102), false));
/// assert!(budget.should_yield(Duration::from_millis(105), false));
/// ```
#[derive(Debug, Clone)]
pub struct SliceBudget {
    /// Length of one slice
    yield_interval: Duration,

    /// Cap on running past the deadline when pressure-aware
    max_yield_interval: Duration,

    /// End of the current slice
    deadline: Duration,

    /// Whether pending input and paint requests are consulted
    pressure_aware: bool,

    /// Set by `request_paint`, cleared at the end of each slice
    needs_paint: bool,

    /// Number of slices started
    slices: u64,
}

impl SliceBudget {
    /// Create a budget with the default slice length
    pub fn new() -> Self {
        Self {
            yield_interval: DEFAULT_YIELD_INTERVAL,
            max_yield_interval: MAX_YIELD_INTERVAL,
            deadline: Duration::ZERO,
            pressure_aware: false,
            needs_paint: false,
            slices: 0,
        }
    }

    /// Build a budget from config
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;

        let mut budget = Self::new()
            .with_yield_interval(config.yield_interval())
            .with_max_yield_interval(config.max_yield_interval())
            .with_pressure_signals(config.pressure_aware);
        if let Some(rate) = config.target_slice_rate {
            budget.set_target_rate(rate)?;
        }
        Ok(budget)
    }

    /// Set the slice length
    pub fn with_yield_interval(mut self, interval: Duration) -> Self {
        self.yield_interval = interval;
        self
    }

    /// Set the cap on running past the deadline
    pub fn with_max_yield_interval(mut self, interval: Duration) -> Self {
        self.max_yield_interval = interval;
        self
    }

    /// Enable or disable input/paint pressure signals
    pub fn with_pressure_signals(mut self, enabled: bool) -> Self {
        self.pressure_aware = enabled;
        self
    }

    /// Start a new slice at `now`
    pub fn begin_slice(&mut self, now: Duration) {
        self.deadline = now.saturating_add(self.yield_interval);
        self.slices += 1;
    }

    /// Finish the current slice
    pub fn end_slice(&mut self) {
        self.needs_paint = false;
    }

    /// Check if the loop should hand control back to the host
    pub fn should_yield(&self, now: Duration, input_pending: bool) -> bool {
        if now < self.deadline {
            return false;
        }
        if !self.pressure_aware {
            return true;
        }
        if self.needs_paint || input_pending {
            return true;
        }
        let slice_start = self.deadline.saturating_sub(self.yield_interval);
        now.saturating_sub(slice_start) >= self.max_yield_interval
    }

    /// Ask the loop to yield at the next deadline check
    pub fn request_paint(&mut self) {
        self.needs_paint = true;
    }

    /// Check if a paint has been requested in this slice
    pub fn needs_paint(&self) -> bool {
        self.needs_paint
    }

    /// Tune the slice length to a target rate in slices per second
    ///
    /// `0` restores the default length. Rates above [`MAX_SLICE_RATE`] are
    /// rejected and leave the budget untouched.
    pub fn set_target_rate(&mut self, rate: u32) -> Result<(), SchedulerError> {
        if rate > MAX_SLICE_RATE {
            error!(rate, max = MAX_SLICE_RATE, "rejecting slice rate");
            return Err(SchedulerError::InvalidSliceRate { rate });
        }

        self.yield_interval = if rate > 0 {
            Duration::from_millis(u64::from(1000 / rate))
        } else {
            DEFAULT_YIELD_INTERVAL
        };
        debug!(rate, interval = ?self.yield_interval, "slice length updated");
        Ok(())
    }

    /// Get the slice length
    pub fn yield_interval(&self) -> Duration {
        self.yield_interval
    }

    /// Get the cap on running past the deadline
    pub fn max_yield_interval(&self) -> Duration {
        self.max_yield_interval
    }

    /// Get the end of the current slice
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Check if pressure signals are consulted
    pub fn is_pressure_aware(&self) -> bool {
        self.pressure_aware
    }

    /// Get the number of slices started
    pub fn slices(&self) -> u64 {
        self.slices
    }
}

impl Default for SliceBudget {
    fn default() -> Self {
        Self::new()
    }
}
