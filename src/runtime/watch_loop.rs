//! # Watch Loop
//!
//! Controller watch loop that monitors Extension resources and triggers
//! reconciliation when changes are detected.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::Extension;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::server::ServerState;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop
///
/// Restarts the watch when its stream ends, until a shutdown signal is received.
pub async fn run_watch_loop(
    extensions: Api<Extension>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: Arc<ControllerConfig>,
) -> Result<(), anyhow::Error> {
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    // Mark the server as not ready once SIGTERM/SIGINT arrives
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = Arc::clone(&backoff_duration_ms);
        let backoff_start_ms = config.backoff_start_ms;
        let backoff_max_ms = config.backoff_max_ms;
        let watch_restart_delay = config.watch_restart_delay_duration();

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!("Starting controller watch loop...");
        Controller::new(extensions.clone(), watcher::Config::default().any_semantic())
            .with_config(
                controller::Config::default()
                    .concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |x| {
                let backoff = Arc::clone(&backoff);
                async move {
                    match &x {
                        Ok((object, action)) => {
                            backoff.store(backoff_start_ms, Ordering::Relaxed);
                            debug!(
                                resource.name = object.name.as_str(),
                                action = ?action,
                                "watch.event.reconciled"
                            );
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                backoff_max_ms,
                                watch_restart_delay,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            watch_restart_delay.as_secs()
        );
        tokio::time::sleep(watch_restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
