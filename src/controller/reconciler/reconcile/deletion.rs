//! # Gated Deletion
//!
//! Deletion runs in two steps. The transition publishes the cleanup bundle and
//! retracts the configuration; the gate then holds the finalizer until the
//! applier reports the cleanup as applied and healthy.

use crate::bundle::{self, BundleKind, BundleRequest};
use crate::controller::reconciler::phase::{can_remove, LifecyclePhase, ObservedHandles};
use crate::controller::reconciler::status::{
    update_status, StatusReport, CONDITION_CLEANUP_HEALTHY, CONDITION_READY,
};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, TriggerSource};
use crate::crd::{Condition, Extension};
use crate::health::HealthOutcome;
use crate::observability;
use crate::store::Owner;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

/// Publish the cleanup bundle and retract the configuration
///
/// The configuration is never re-published here, even when both handles exist
/// after an interrupted pass.
pub async fn reconcile_transition(
    extension: &Extension,
    ctx: &Reconciler,
    namespace: &str,
    handles: &ObservedHandles,
) -> Result<Action, ReconcilerError> {
    if handles.cleanup.is_none() {
        let cluster = ctx.facts.cluster_context(namespace).await?;
        let bundle = bundle::build(BundleRequest::Cleanup, &cluster)?;
        ctx.store
            .publish(namespace, &bundle, &Owner::of(extension))
            .await?;
        observability::metrics::increment_bundles_published(BundleKind::Cleanup.as_str());
        info!("Published cleanup bundle to {}/{}", namespace, bundle.kind().handle_name());
    }

    if let Some(configuration) = &handles.configuration {
        ctx.store.retract(namespace, &configuration.name).await?;
        observability::metrics::increment_bundles_retracted(BundleKind::Configuration.as_str());
        info!("Retracted configuration bundle {}/{}", namespace, configuration.name);
    }

    update_status(
        ctx,
        extension,
        StatusReport::new(
            LifecyclePhase::DeletingTransition.as_str(),
            "Host cleanup published, configuration retracted",
        )
        .condition(Condition::new(CONDITION_READY, false, "Deleting", None))
        .condition(Condition::new(
            CONDITION_CLEANUP_HEALTHY,
            false,
            "CleanupPublished",
            None,
        )),
    )
    .await?;

    let poll = ctx.health_gate.poll_interval();
    observability::metrics::increment_requeues_total(TriggerSource::HealthPoll.as_str());
    Ok(Action::requeue(poll))
}

/// Release the finalizer once the cleanup is verified
///
/// A cleanup that stays unhealthy past the timeout is reported but still holds
/// the finalizer.
pub async fn reconcile_gated(
    extension: &Extension,
    ctx: &Reconciler,
    namespace: &str,
    handles: &ObservedHandles,
) -> Result<Action, ReconcilerError> {
    let Some(cleanup) = &handles.cleanup else {
        return Err(ReconcilerError::InvariantViolation(
            "deletion gated without a cleanup handle".to_string(),
        ));
    };

    let outcome = ctx.health_gate.evaluate(&cleanup.status);
    observability::metrics::increment_health_outcomes(outcome.as_str());
    debug!("Cleanup {}/{} health: {:?}", namespace, cleanup.name, outcome);

    if can_remove(&outcome) {
        ctx.store.retract(namespace, &cleanup.name).await?;
        observability::metrics::increment_bundles_retracted(BundleKind::Cleanup.as_str());
        ctx.extensions.remove_finalizer(extension).await?;
        observability::metrics::increment_finalizers_removed();
        ctx.forget_resource(namespace, &extension.name_any());
        info!(
            "Host cleanup verified, released finalizer of {}/{}",
            namespace,
            extension.name_any()
        );
        return Ok(Action::await_change());
    }

    let overdue = ctx
        .health_gate
        .is_overdue(cleanup.published_at, chrono::Utc::now());
    let (reason, message) = match &outcome {
        HealthOutcome::Failed(detail) if overdue => (
            "CleanupOverdue",
            format!("cleanup not healthy within the health timeout: {detail}"),
        ),
        _ if overdue => (
            "CleanupOverdue",
            "cleanup not applied within the health timeout".to_string(),
        ),
        HealthOutcome::Failed(detail) => ("CleanupUnhealthy", detail.clone()),
        _ => (
            "CleanupPending",
            "waiting for the cleanup to be applied and healthy".to_string(),
        ),
    };
    if overdue {
        warn!(
            "Cleanup {}/{} overdue, finalizer stays until it is healthy: {}",
            namespace, cleanup.name, message
        );
    }

    update_status(
        ctx,
        extension,
        StatusReport::new(
            LifecyclePhase::DeletingGated.as_str(),
            "Waiting for host cleanup before releasing the finalizer",
        )
        .condition(Condition::new(CONDITION_READY, false, "Deleting", None))
        .condition(Condition::new(
            CONDITION_CLEANUP_HEALTHY,
            false,
            reason,
            Some(message.clone()),
        )),
    )
    .await?;

    Err(ReconcilerError::NotYetHealthy(message))
}
