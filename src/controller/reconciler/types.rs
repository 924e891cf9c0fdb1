//! # Types
//!
//! Core types for the reconciler.

use crate::bundle::BuildError;
use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::extension_api::{ExtensionApi, KubeExtensionApi};
use crate::facts::{ClusterFactsProvider, FactsError, KubeClusterFacts};
use crate::health::HealthGate;
use crate::store::{
    BundleStore, CredentialError, CredentialResolver, KubeCredentialResolver, ManagedResourceStore,
    StoreError,
};
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Operator input error, reported on the Extension and never retried
    #[error("invalid configuration at {path}: {reason}")]
    InvalidConfiguration { path: String, reason: String },
    #[error("bundle store error: {0}")]
    TransientStore(#[from] StoreError),
    /// The cleanup bundle is not yet verified, retried on the poll cadence
    #[error("cleanup not yet healthy: {0}")]
    NotYetHealthy(String),
    /// Observed state contradicts the one-handle-per-kind invariant
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("cluster facts unavailable: {0}")]
    ClusterFacts(#[from] FactsError),
    #[error("TLS material unavailable: {0}")]
    Credentials(CredentialError),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl ReconcilerError {
    /// Short error kind for metrics and status reasons
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::InvalidConfiguration { .. } => "InvalidConfiguration",
            ReconcilerError::TransientStore(_) => "TransientStoreError",
            ReconcilerError::NotYetHealthy(_) => "NotYetHealthy",
            ReconcilerError::InvariantViolation(_) => "InvariantViolation",
            ReconcilerError::ClusterFacts(_) => "ClusterFactsUnavailable",
            ReconcilerError::Credentials(_) => "CredentialsUnavailable",
            ReconcilerError::Kube(_) => "KubeApiError",
        }
    }
}

impl From<BuildError> for ReconcilerError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::InvalidConfiguration { path, reason } => {
                ReconcilerError::InvalidConfiguration { path, reason }
            }
            // Rendering our own value trees cannot fail on valid input
            BuildError::Serialize { .. } => ReconcilerError::InvariantViolation(err.to_string()),
        }
    }
}

impl From<CredentialError> for ReconcilerError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::MissingKey { .. } => ReconcilerError::InvalidConfiguration {
                path: "providerConfig.tls.secretReferenceName".to_string(),
                reason: err.to_string(),
            },
            other => ReconcilerError::Credentials(other),
        }
    }
}

/// Trigger source for requeues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Periodic resync of an active extension
    Resync,
    /// Health gate poll while deletion is gated
    HealthPoll,
    /// Retry after a transient error
    ErrorBackoff,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Resync => "resync",
            TriggerSource::HealthPoll => "health-poll",
            TriggerSource::ErrorBackoff => "error-backoff",
        }
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(start, max),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconciliation context
#[derive(Clone)]
pub struct Reconciler {
    pub config: Arc<ControllerConfig>,
    pub store: Arc<dyn BundleStore>,
    pub facts: Arc<dyn ClusterFactsProvider>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub extensions: Arc<dyn ExtensionApi>,
    pub health_gate: HealthGate,
    // Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    // Serializes passes per resource (identified by namespace/name)
    pub reconcile_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("health_gate", &self.health_gate)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        config: Arc<ControllerConfig>,
        store: Arc<dyn BundleStore>,
        facts: Arc<dyn ClusterFactsProvider>,
        credentials: Arc<dyn CredentialResolver>,
        extensions: Arc<dyn ExtensionApi>,
    ) -> Self {
        let health_gate = HealthGate::new(config.health_poll_interval(), config.health_timeout());
        Self {
            config,
            store,
            facts,
            credentials,
            extensions,
            health_gate,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            reconcile_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconciler talking to the Kubernetes API for every collaborator
    pub fn from_client(client: Client, config: Arc<ControllerConfig>) -> Self {
        let store = ManagedResourceStore::new(client.clone(), config.store_conflict_retries);
        Self::new(
            config,
            Arc::new(store),
            Arc::new(KubeClusterFacts::new(client.clone())),
            Arc::new(KubeCredentialResolver::new(client.clone())),
            Arc::new(KubeExtensionApi::new(client)),
        )
    }

    /// Get or create the reconciliation lock for a resource
    pub fn reconcile_lock(&self, namespace: &str, name: &str) -> Arc<AsyncMutex<()>> {
        let resource_key = format!("{namespace}/{name}");
        let mut locks = match self.reconcile_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry(resource_key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Drop a lock handed out by [`Self::reconcile_lock`] once its guard is released
    ///
    /// The map entry is removed only when no other pass holds or waits on the lock.
    pub fn release_lock(&self, namespace: &str, name: &str, lock: Arc<AsyncMutex<()>>) {
        let resource_key = format!("{namespace}/{name}");
        let mut locks = match self.reconcile_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        let unused = locks
            .get(&resource_key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if unused {
            locks.remove(&resource_key);
        }
    }

    /// Forget the backoff state of a resource that is gone
    pub fn forget_resource(&self, namespace: &str, name: &str) {
        let resource_key = format!("{namespace}/{name}");
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(&resource_key);
        }
    }

    /// Reset backoff after a successful pass, returns whether the resource was backing off
    pub fn reset_backoff(&self, namespace: &str, name: &str) -> bool {
        let resource_key = format!("{namespace}/{name}");
        let Ok(mut states) = self.backoff_states.lock() else {
            return false;
        };
        states.get_mut(&resource_key).is_some_and(|state| {
            let had_errors = state.error_count > 0;
            state.reset();
            had_errors
        })
    }

    /// Next backoff delay for a failing resource
    pub fn next_backoff(&self, namespace: &str, name: &str) -> (Duration, u32) {
        let resource_key = format!("{namespace}/{name}");
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key).or_insert_with(|| {
                    BackoffState::new(
                        self.config.backoff_start_duration(),
                        self.config.backoff_max_duration(),
                    )
                });
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(_) => (self.config.backoff_max_duration(), 0),
        }
    }
}
