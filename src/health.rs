//! # Health Gate
//!
//! Decides whether a published bundle has been applied and is healthy, judged
//! only from the applier-reported status of its handle. The gate is the only
//! component allowed to let a deletion proceed.

use crate::store::BundleStatus;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Verdict on a published handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Not yet observed, applied or judged
    Pending,
    Healthy,
    /// Applied but unhealthy, with the applier's explanation
    Failed(String),
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy)
    }

    /// Short label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthOutcome::Pending => "pending",
            HealthOutcome::Healthy => "healthy",
            HealthOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthGate {
    poll_interval: Duration,
    timeout: Duration,
}

impl HealthGate {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Delay before the next evaluation of a non-healthy handle
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn evaluate(&self, status: &BundleStatus) -> HealthOutcome {
        if status.observed_generation < status.generation {
            return HealthOutcome::Pending;
        }
        if !status.applied().is_some_and(|c| c.is_true()) {
            return HealthOutcome::Pending;
        }
        match status.healthy() {
            Some(c) if c.status == "False" => {
                let reason = c.reason.as_deref().unwrap_or("Unhealthy");
                HealthOutcome::Failed(match c.message.as_deref() {
                    Some(message) if !message.is_empty() => format!("{reason}: {message}"),
                    _ => reason.to_string(),
                })
            }
            Some(c) if c.is_true() => HealthOutcome::Healthy,
            _ => HealthOutcome::Pending,
        }
    }

    /// Whether a handle has stayed non-healthy past the timeout
    ///
    /// Only the reported reason changes; an overdue gate still holds.
    pub fn is_overdue(&self, published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(published_at) = published_at else {
            return false;
        };
        (now - published_at)
            .to_std()
            .is_ok_and(|elapsed| elapsed > self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{CONDITION_RESOURCES_APPLIED, CONDITION_RESOURCES_HEALTHY, Condition};

    fn gate() -> HealthGate {
        HealthGate::new(Duration::from_secs(5), Duration::from_secs(600))
    }

    fn status(generation: i64, observed: i64, conditions: Vec<Condition>) -> BundleStatus {
        BundleStatus {
            generation,
            observed_generation: observed,
            conditions,
        }
    }

    fn applied(ok: bool) -> Condition {
        Condition::new(CONDITION_RESOURCES_APPLIED, ok, "Applied", None)
    }

    fn healthy(ok: bool) -> Condition {
        Condition::new(
            CONDITION_RESOURCES_HEALTHY,
            ok,
            "DaemonSetUnhealthy",
            Some("1 of 3 pods not ready".to_string()),
        )
    }

    #[test]
    fn test_healthy_when_observed_applied_and_healthy() {
        let outcome = gate().evaluate(&status(2, 2, vec![applied(true), healthy(true)]));
        assert_eq!(outcome, HealthOutcome::Healthy);
    }

    #[test]
    fn test_stale_generation_is_pending() {
        // Conditions describe an older generation
        let outcome = gate().evaluate(&status(3, 2, vec![applied(true), healthy(true)]));
        assert_eq!(outcome, HealthOutcome::Pending);
    }

    #[test]
    fn test_missing_or_false_applied_is_pending() {
        assert_eq!(gate().evaluate(&status(1, 1, vec![])), HealthOutcome::Pending);
        assert_eq!(
            gate().evaluate(&status(1, 1, vec![applied(false), healthy(false)])),
            HealthOutcome::Pending
        );
        assert_eq!(
            gate().evaluate(&status(1, 1, vec![applied(true)])),
            HealthOutcome::Pending
        );
    }

    #[test]
    fn test_unhealthy_carries_reason() {
        let outcome = gate().evaluate(&status(1, 1, vec![applied(true), healthy(false)]));
        assert_eq!(
            outcome,
            HealthOutcome::Failed("DaemonSetUnhealthy: 1 of 3 pods not ready".to_string())
        );
        assert!(!outcome.is_healthy());
    }

    #[test]
    fn test_is_overdue() {
        let gate = gate();
        let now = Utc::now();
        assert!(!gate.is_overdue(None, now));
        assert!(!gate.is_overdue(Some(now - chrono::Duration::seconds(599)), now));
        assert!(gate.is_overdue(Some(now - chrono::Duration::seconds(601)), now));
        // Clock skew puts the publish time in the future
        assert!(!gate.is_overdue(Some(now + chrono::Duration::seconds(10)), now));
    }
}
