//! # Active Extensions
//!
//! Renders the configuration bundle and publishes it. Every pass re-renders
//! from the current inputs, so manual edits to published objects are reverted
//! on the next resync.

use crate::bundle::{self, BundleKind, BundleRequest};
use crate::controller::reconciler::phase::{LifecyclePhase, ObservedHandles};
use crate::controller::reconciler::status::{
    update_status, StatusReport, CONDITION_READY, PHASE_FAILED,
};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, TriggerSource};
use crate::crd::{Condition, Extension};
use crate::observability;
use crate::store::Owner;
use kube_runtime::controller::Action;
use tracing::{info, warn};

pub async fn reconcile_active(
    extension: &Extension,
    ctx: &Reconciler,
    namespace: &str,
    handles: &ObservedHandles,
) -> Result<Action, ReconcilerError> {
    // Before anything is published, so a deletion can never skip host cleanup
    ctx.extensions.add_finalizer(extension).await?;

    match publish_configuration(extension, ctx, namespace).await {
        Ok(()) => {}
        Err(ReconcilerError::InvalidConfiguration { path, reason }) => {
            return reject(extension, ctx, &path, &reason).await;
        }
        Err(e) => return Err(e),
    }

    // Left behind by a deletion that was withdrawn or by an older controller
    if let Some(stray) = &handles.cleanup {
        info!("Retracting leftover cleanup handle {}/{}", namespace, stray.name);
        ctx.store.retract(namespace, &stray.name).await?;
        observability::metrics::increment_bundles_retracted(BundleKind::Cleanup.as_str());
    }

    update_status(
        ctx,
        extension,
        StatusReport::new(
            LifecyclePhase::Active.as_str(),
            format!(
                "Configuration published as {}",
                BundleKind::Configuration.handle_name()
            ),
        )
        .condition(Condition::new(
            CONDITION_READY,
            true,
            "ConfigurationPublished",
            None,
        )),
    )
    .await?;

    let resync = ctx.config.resync_interval();
    info!(
        "Next scheduled reconciliation in {}s (trigger source: {})",
        resync.as_secs(),
        TriggerSource::Resync.as_str()
    );
    observability::metrics::increment_requeues_total(TriggerSource::Resync.as_str());
    Ok(Action::requeue(resync))
}

async fn publish_configuration(
    extension: &Extension,
    ctx: &Reconciler,
    namespace: &str,
) -> Result<(), ReconcilerError> {
    let config = extension.rsyslog_config()?;
    // Input errors are reported even while cluster facts are unavailable
    config.validate()?;

    let cluster = ctx.facts.cluster_context(namespace).await?;
    let secret = match config.enabled_tls() {
        Some(tls) => {
            let reference = tls.secret_reference_name.as_deref().unwrap_or_default();
            Some(ctx.credentials.resolve(namespace, reference).await?)
        }
        None => None,
    };

    let bundle = bundle::build(
        BundleRequest::Configuration {
            config: &config,
            secret: secret.as_ref(),
        },
        &cluster,
    )?;
    ctx.store
        .publish(namespace, &bundle, &Owner::of(extension))
        .await?;
    observability::metrics::increment_bundles_published(bundle.kind().as_str());
    info!(
        "Published configuration bundle with {} manifests to {}/{}",
        bundle.len(),
        namespace,
        bundle.kind().handle_name()
    );
    Ok(())
}

/// Report rejected input on the Extension and wait for it to change
async fn reject(
    extension: &Extension,
    ctx: &Reconciler,
    path: &str,
    reason: &str,
) -> Result<Action, ReconcilerError> {
    let message = format!("invalid configuration at {path}: {reason}");
    warn!("Rejecting Extension configuration: {}", message);
    observability::metrics::increment_reconciliation_errors("InvalidConfiguration");

    update_status(
        ctx,
        extension,
        StatusReport::new(PHASE_FAILED, "Configuration rejected, fix providerConfig to retry")
            .condition(Condition::new(
                CONDITION_READY,
                false,
                "InvalidConfiguration",
                Some(message.clone()),
            ))
            .error(message),
    )
    .await?;
    Ok(Action::await_change())
}
