//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//!
//! - Gated deletions waiting on the health gate are polled at a fixed cadence
//! - Rejected configuration waits for the Extension to change
//! - Everything else retries with per-resource exponential backoff

use crate::controller::reconciler::{Reconciler, ReconcilerError, TriggerSource};
use crate::crd::Extension;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Handle reconciliation errors
pub fn handle_reconciliation_error(
    obj: Arc<Extension>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error_action(&ctx, &namespace, &name, error)
}

/// Requeue action for a failed pass of the resource `namespace/name`
pub fn error_action(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    error: &ReconcilerError,
) -> Action {
    match error {
        ReconcilerError::NotYetHealthy(reason) => {
            // Expected while the cleanup rolls out, not a failure
            let poll = ctx.health_gate.poll_interval();
            info!(
                "Deletion of {}/{} gated: {} (next check in {}s)",
                namespace,
                name,
                reason,
                poll.as_secs()
            );
            observability::metrics::increment_requeues_total(TriggerSource::HealthPoll.as_str());
            Action::requeue(poll)
        }
        ReconcilerError::InvalidConfiguration { .. } => {
            warn!("Rejected configuration for {}/{}: {}", namespace, name, error);
            observability::metrics::increment_reconciliation_errors(error.kind());
            Action::await_change()
        }
        _ => {
            if matches!(error, ReconcilerError::InvariantViolation(_)) {
                error!(
                    "Invariant violated for {}/{}, manual inspection may be needed: {}",
                    namespace, name, error
                );
            } else {
                error!("Reconciliation error for {}/{}: {}", namespace, name, error);
            }
            observability::metrics::increment_reconciliation_errors(error.kind());

            let (delay, error_count) = ctx.next_backoff(namespace, name);
            let next_trigger_time = chrono::Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            info!(
                "Retrying with exponential backoff: {}ms (error count: {}, next retry: {}, trigger source: {})",
                delay.as_millis(),
                error_count,
                next_trigger_time.to_rfc3339(),
                TriggerSource::ErrorBackoff.as_str()
            );
            observability::metrics::increment_requeues_total(TriggerSource::ErrorBackoff.as_str());
            Action::requeue(delay)
        }
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    async {
        match classify_watch_error(error_string) {
            WatchErrorClass::Unauthorized => {
                error!(
                    "Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
                );
                warn!(
                    "Waiting {}s before retrying watch...",
                    watch_restart_delay.as_secs()
                );
                tokio::time::sleep(watch_restart_delay).await;
                None
            }
            WatchErrorClass::Expired => {
                warn!("Watch resource version expired (410), watch will restart");
                None
            }
            WatchErrorClass::Throttled => {
                let current_backoff = backoff.load(Ordering::Relaxed);
                warn!(
                    "API server throttling or reinitializing (429), backing off for {}ms before restart...",
                    current_backoff
                );
                tokio::time::sleep(Duration::from_millis(current_backoff)).await;
                backoff.store(
                    current_backoff.saturating_mul(2).min(max_backoff_ms),
                    Ordering::Relaxed,
                );
                None
            }
            WatchErrorClass::NotFound => {
                warn!(
                    "Resource not found (404) - normal for deleted objects, check that the Extension CRD is installed. Error: {}",
                    error_string
                );
                Some(())
            }
            WatchErrorClass::Other => {
                error!("Controller stream error: {}", error_string);
                tokio::time::sleep(watch_restart_delay).await;
                None
            }
        }
    }
    .instrument(error_span)
    .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

/// Classify a watch error from its debug representation
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    // 404s can carry "WatchFailed" in their chain, check them first
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found {
        WatchErrorClass::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorClass::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorClass::Throttled
    } else if is_not_found {
        WatchErrorClass::NotFound
    } else {
        WatchErrorClass::Other
    }
}
