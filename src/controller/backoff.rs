//! # Exponential Backoff
//!
//! Per-resource retry delays for transient reconciliation failures.
//! Each failure doubles the base delay up to a maximum; a bounded ±20% jitter
//! is applied so that extensions failing together do not retry in lockstep.
//!
//! ## Usage
//!
//! ```rust
//! use rsyslog_relp_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
//! let first = backoff.next_backoff();
//! assert!(first >= Duration::from_millis(800) && first <= Duration::from_millis(1200));
//! ```

use rand::Rng;
use std::time::Duration;

/// Fraction of the base delay added or removed as jitter
const JITTER: f64 = 0.2;

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    start: Duration,
    max: Duration,
    /// Number of failures since the last reset
    attempts: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            start,
            max: max.max(start),
            attempts: 0,
        }
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Next base delay without jitter, advancing the sequence
    pub fn next_base(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.start.saturating_mul(factor).min(self.max)
    }

    /// Next delay with jitter applied, advancing the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        let base = self.next_base();
        let factor = rand::rng().random_range((1.0 - JITTER)..=(1.0 + JITTER));
        base.mul_f64(factor)
    }

    /// Reset after a successful reconciliation
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
