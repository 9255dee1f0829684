//! Task priority levels
//!
//! Every task belongs to one of five ranked classes. The class decides how
//! long the task may wait in the ready queue before it is considered expired,
//! and expired tasks run even when the host asks the loop to yield.

use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Timeout for user-blocking work (250ms)
pub const USER_BLOCKING_TIMEOUT: Duration = Duration::from_millis(250);

/// Timeout for normal work (5s)
pub const NORMAL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Timeout for low priority work (10s)
pub const LOW_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Timeout for idle work; large enough that it is never reached in practice.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(1_073_741_823);

/// Immediate tasks expire this long before they start.
pub const IMMEDIATE_BACKDATE: Duration = Duration::from_millis(1);

/// Priority levels
///
/// Lower variants are more urgent: `Immediate < UserBlocking < Normal < Low < Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PriorityLevel {
    /// Must run now; expired as soon as it is scheduled
    Immediate = 1,

    /// Direct response to user input
    UserBlocking = 2,

    /// Default level for ordinary work
    #[default]
    Normal = 3,

    /// Work that can wait a while
    Low = 4,

    /// Runs only when nothing else is ready
    Idle = 5,
}

impl PriorityLevel {
    /// All levels, most urgent first
    pub const ALL: [PriorityLevel; 5] = [
        PriorityLevel::Immediate,
        PriorityLevel::UserBlocking,
        PriorityLevel::Normal,
        PriorityLevel::Low,
        PriorityLevel::Idle,
    ];

    /// Convert a raw level, coercing unknown values to `Normal`.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1 => PriorityLevel::Immediate,
            2 => PriorityLevel::UserBlocking,
            3 => PriorityLevel::Normal,
            4 => PriorityLevel::Low,
            5 => PriorityLevel::Idle,
            other => {
                warn!(raw = other, "unknown priority level, using Normal");
                PriorityLevel::Normal
            }
        }
    }

    /// Raw numeric value of this level
    pub fn as_raw(self) -> i64 {
        self as i64
    }

    /// Maximum wait before a task of this level counts as expired.
    ///
    /// Returns `None` for `Immediate`, which is expired on arrival.
    pub fn timeout(self) -> Option<Duration> {
        match self {
            PriorityLevel::Immediate => None,
            PriorityLevel::UserBlocking => Some(USER_BLOCKING_TIMEOUT),
            PriorityLevel::Normal => Some(NORMAL_TIMEOUT),
            PriorityLevel::Low => Some(LOW_TIMEOUT),
            PriorityLevel::Idle => Some(IDLE_TIMEOUT),
        }
    }

    /// Expiration time of a task of this level starting at `start_time`.
    pub fn expiration_for(self, start_time: Duration) -> Duration {
        match self.timeout() {
            Some(timeout) => start_time.saturating_add(timeout),
            None => start_time.saturating_sub(IMMEDIATE_BACKDATE),
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PriorityLevel::Immediate => "immediate",
            PriorityLevel::UserBlocking => "user-blocking",
            PriorityLevel::Normal => "normal",
            PriorityLevel::Low => "low",
            PriorityLevel::Idle => "idle",
        };
        f.write_str(name)
    }
}

impl From<i64> for PriorityLevel {
    fn from(raw: i64) -> Self {
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(PriorityLevel::Immediate < PriorityLevel::UserBlocking);
        assert!(PriorityLevel::UserBlocking < PriorityLevel::Normal);
        assert!(PriorityLevel::Normal < PriorityLevel::Low);
        assert!(PriorityLevel::Low < PriorityLevel::Idle);
    }

    #[test]
    fn test_raw_round_trip() {
        for level in PriorityLevel::ALL {
            assert_eq!(PriorityLevel::from_raw(level.as_raw()), level);
        }
    }

    #[test]
    fn test_unknown_raw_coerces_to_normal() {
        assert_eq!(PriorityLevel::from_raw(0), PriorityLevel::Normal);
        assert_eq!(PriorityLevel::from_raw(42), PriorityLevel::Normal);
        assert_eq!(PriorityLevel::from(-7), PriorityLevel::Normal);
    }

    #[test]
    fn test_default_is_normal() {
        assert_eq!(PriorityLevel::default(), PriorityLevel::Normal);
    }

    #[test]
    fn test_immediate_is_already_expired() {
        let start = Duration::from_millis(100);
        assert!(PriorityLevel::Immediate.expiration_for(start) < start);

        // Saturates at the epoch instead of underflowing
        assert_eq!(PriorityLevel::Immediate.expiration_for(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_timeouts_grow_with_level() {
        let start = Duration::from_secs(1);
        let expirations: Vec<_> =
            PriorityLevel::ALL.iter().map(|level| level.expiration_for(start)).collect();

        for pair in expirations.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(expirations[2], start + NORMAL_TIMEOUT);
        assert_eq!(expirations[4], start + IDLE_TIMEOUT);
    }

    #[test]
    fn test_display() {
        assert_eq!(PriorityLevel::UserBlocking.to_string(), "user-blocking");
        assert_eq!(PriorityLevel::Idle.to_string(), "idle");
    }
}
