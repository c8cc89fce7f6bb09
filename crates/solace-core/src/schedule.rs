//! # Sync Schedule
//!
//! Timing policy for the engine: debounce window, periodic flush interval
//! and retry backoff. Pure values only; the engine owns the actual timers.
//!
//! ## Backoff Progression
//! ```text
//!   failure #   1    2    3    4     5     6     7 …
//!   delay (s)   2    4    8    16    32    60    60 …
//!                                          ▲
//!                                          └── ceiling
//!   any success ──► reset to 2s
//! ```

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

// =============================================================================
// Schedule
// =============================================================================

/// Timing parameters for one sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSchedule {
    /// Quiet period after the last local change before a push.
    pub debounce: Duration,

    /// Forced push attempt interval, independent of change events.
    pub flush_interval: Duration,

    /// First retry delay after a failure.
    pub backoff_floor: Duration,

    /// Retry delays never exceed this.
    pub backoff_ceiling: Duration,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            flush_interval: Duration::from_secs(60),
            backoff_floor: Duration::from_secs(2),
            backoff_ceiling: Duration::from_secs(60),
        }
    }
}

impl SyncSchedule {
    /// Creates the retry policy for this schedule.
    pub fn retry_backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.backoff_floor, self.backoff_ceiling)
    }
}

// =============================================================================
// Retry Backoff
// =============================================================================

/// Exponential retry delay: doubles per consecutive failure, capped, no
/// jitter, never gives up.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    inner: ExponentialBackoff,
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl RetryBackoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        let inner = ExponentialBackoffBuilder::new()
            .with_initial_interval(floor)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(ceiling)
            .with_max_elapsed_time(None)
            .build();

        Self {
            inner,
            floor,
            ceiling,
            current: floor,
        }
    }

    /// Delay to wait before the next retry. Advances the progression.
    pub fn next_delay(&mut self) -> Duration {
        // max_elapsed_time is None, so the iterator never ends
        let delay = self.inner.next_backoff().unwrap_or(self.ceiling);
        self.current = (delay * 2).min(self.ceiling);
        delay
    }

    /// Back to the floor. Called after any successful remote operation.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.current = self.floor;
    }

    /// The delay the next failure will wait.
    pub fn current(&self) -> Duration {
        self.current
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        SyncSchedule::default().retry_backoff()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(delays: &[Duration]) -> Vec<u64> {
        delays.iter().map(|d| d.as_secs()).collect()
    }

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = RetryBackoff::default();
        let delays: Vec<Duration> = (0..8).map(|_| backoff.next_delay()).collect();
        assert_eq!(secs(&delays), vec![2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn test_backoff_reset_returns_to_floor() {
        let mut backoff = RetryBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_secs(8));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_ceiling_below_floor_is_clamped() {
        let mut backoff = RetryBackoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_schedule() {
        let schedule = SyncSchedule::default();
        assert_eq!(schedule.debounce, Duration::from_secs(2));
        assert_eq!(schedule.flush_interval, Duration::from_secs(60));
    }
}
