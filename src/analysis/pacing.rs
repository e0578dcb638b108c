//! Delay between analysis cycles.
//!
//! After a failure the delay grows linearly with the number of consecutive
//! failures, clamped to [`Pacing::backoff_cap`]. After a success the cycle is
//! padded out to the configured interval.

use std::time::Duration;

use crate::AnalysisConfig;

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub interval: Duration,
    pub backoff_cap: Duration,
    pub min_delay: Duration,
}

impl From<&AnalysisConfig> for Pacing {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            interval: config.interval(),
            backoff_cap: config.backoff_cap(),
            min_delay: config.min_delay(),
        }
    }
}

/// Consecutive-error count carried from one cycle to the next.
#[derive(Debug, Clone)]
pub struct Backoff {
    pacing: Pacing,
    consecutive_errors: u32,
}

impl Backoff {
    pub fn new(pacing: Pacing) -> Self {
        Self {
            pacing,
            consecutive_errors: 0,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Record a failed cycle and return how long to wait before the next one.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.pacing
            .interval
            .checked_mul(self.consecutive_errors)
            .map_or(self.pacing.backoff_cap, |delay| delay.min(self.pacing.backoff_cap))
    }

    /// Record a successful cycle that took `elapsed` and return the wait that
    /// keeps the cadence at one cycle per interval.
    pub fn on_success(&mut self, elapsed: Duration) -> Duration {
        self.consecutive_errors = 0;
        self.pacing
            .interval
            .saturating_sub(elapsed)
            .max(self.pacing.min_delay)
    }
}
