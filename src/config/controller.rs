//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_EXTENSION_TYPE,
    DEFAULT_HEALTH_POLL_INTERVAL_SECS, DEFAULT_HEALTH_TIMEOUT_SECS,
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT, DEFAULT_RESYNC_INTERVAL_SECS,
    DEFAULT_STORE_CONFLICT_RETRIES, DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Extension type handled by this controller
    pub extension_type: String,
    /// Interval between health gate evaluations (seconds)
    pub health_poll_interval_secs: u64,
    /// Time after which a non-healthy cleanup is reported as overdue (seconds)
    pub health_timeout_secs: u64,
    /// Resync interval for active extensions (seconds)
    pub resync_interval_secs: u64,
    /// Exponential backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Re-read attempts after a publish conflict
    pub store_conflict_retries: u32,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Watch stream restart delay (seconds)
    pub watch_restart_delay_secs: u64,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            extension_type: lookup("EXTENSION_TYPE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_EXTENSION_TYPE.to_string()),
            health_poll_interval_secs: or_default(
                lookup("HEALTH_POLL_INTERVAL_SECS"),
                DEFAULT_HEALTH_POLL_INTERVAL_SECS,
            ),
            health_timeout_secs: or_default(lookup("HEALTH_TIMEOUT_SECS"), DEFAULT_HEALTH_TIMEOUT_SECS),
            resync_interval_secs: or_default(
                lookup("RESYNC_INTERVAL_SECS"),
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            backoff_start_ms: or_default(lookup("BACKOFF_START_MS"), DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: or_default(lookup("BACKOFF_MAX_MS"), DEFAULT_BACKOFF_MAX_MS),
            store_conflict_retries: or_default(
                lookup("STORE_CONFLICT_RETRIES"),
                DEFAULT_STORE_CONFLICT_RETRIES,
            ),
            max_concurrent_reconciliations: or_default(
                lookup("MAX_CONCURRENT_RECONCILIATIONS"),
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            metrics_port: or_default(lookup("METRICS_PORT"), DEFAULT_METRICS_PORT),
            watch_restart_delay_secs: or_default(
                lookup("WATCH_RESTART_DELAY_SECS"),
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
        }
    }

    /// Get health poll interval duration
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_secs(self.health_poll_interval_secs)
    }

    /// Get health timeout duration
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Get resync interval duration
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Parse a value or fall back to the default
fn or_default<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
