//! # Reconciliation Logic
//!
//! One reconciliation pass for an Extension. The pass observes the handles in
//! the store, derives the lifecycle phase and runs the matching step. Errors are
//! handled by the error policy of the runtime.

mod active;
mod deletion;

pub use active::reconcile_active;
pub use deletion::{reconcile_gated, reconcile_transition};

use crate::bundle::BundleKind;
use crate::constants::FINALIZER;
use crate::controller::reconciler::phase::{derive_phase, LifecyclePhase, ObservedHandles};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::Extension;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};

/// Main reconciliation function
pub async fn reconcile(
    extension: Arc<Extension>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = extension.name_any();
    let namespace = extension.namespace().unwrap_or_default();

    if extension.spec.extension_type != ctx.config.extension_type {
        debug!(
            "Ignoring Extension {}/{} of type {}",
            namespace, name, extension.spec.extension_type
        );
        return Ok(Action::await_change());
    }

    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.name = %name,
        resource.namespace = %namespace,
        resource.kind = "Extension"
    );
    run_pass(extension, ctx, namespace, name).instrument(span).await
}

async fn run_pass(
    extension: Arc<Extension>,
    ctx: Arc<Reconciler>,
    namespace: String,
    name: String,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    observability::metrics::increment_reconciliations();

    // At most one pass per extension at a time
    let lock = ctx.reconcile_lock(&namespace, &name);
    let result = {
        let _guard = lock.lock().await;
        run_phase(&extension, &ctx, &namespace, &name).await
    };
    ctx.release_lock(&namespace, &name, lock);
    let action = result?;

    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    if ctx.reset_backoff(&namespace, &name) {
        info!("Backoff reset for {}/{} after successful pass", namespace, name);
    }
    Ok(action)
}

async fn run_phase(
    extension: &Extension,
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let handles = observe_handles(ctx, namespace).await?;
    let phase = derive_phase(
        &handles,
        extension.has_finalizer(FINALIZER),
        extension.deletion_requested(),
    )?;
    info!("Reconciling Extension {}/{} (phase: {})", namespace, name, phase);

    match phase {
        LifecyclePhase::Absent | LifecyclePhase::Active => {
            reconcile_active(extension, ctx, namespace, &handles).await
        }
        LifecyclePhase::DeletingTransition => {
            reconcile_transition(extension, ctx, namespace, &handles).await
        }
        LifecyclePhase::DeletingGated => reconcile_gated(extension, ctx, namespace, &handles).await,
        LifecyclePhase::Removed => {
            debug!("Finalizer already released for {}/{}", namespace, name);
            Ok(Action::await_change())
        }
    }
}

/// Read both handles of an extension namespace
pub async fn observe_handles(
    ctx: &Reconciler,
    namespace: &str,
) -> Result<ObservedHandles, ReconcilerError> {
    Ok(ObservedHandles {
        configuration: ctx
            .store
            .get(namespace, BundleKind::Configuration.handle_name())
            .await?,
        cleanup: ctx
            .store
            .get(namespace, BundleKind::Cleanup.handle_name())
            .await?,
    })
}
