//! In-memory bundle store for testing
//!
//! Mimics the applier's generation bookkeeping: publishing changed content
//! bumps the handle's generation, and the applier's view is driven by
//! [`InMemoryBundleStore::set_health`].

use crate::bundle::Bundle;
use crate::crd::{CONDITION_RESOURCES_APPLIED, CONDITION_RESOURCES_HEALTHY, Condition};
use crate::store::{BundleStatus, BundleStore, Owner, PublishedBundle, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Applier verdict on a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedHealth {
    /// Applied and healthy
    Healthy,
    /// Applied but the resulting objects are unhealthy
    Unhealthy { reason: String, message: String },
    /// Applying failed
    NotApplied { reason: String, message: String },
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub publishes: usize,
    pub retracts: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    bundle: PublishedBundle,
    owner: Owner,
}

/// In-memory bundle store
#[derive(Debug, Clone, Default)]
pub struct InMemoryBundleStore {
    /// Handles keyed by (namespace, name)
    handles: Arc<RwLock<HashMap<(String, String), Entry>>>,
    operations: Arc<RwLock<OperationCounts>>,
    /// Number of upcoming publish/retract calls that fail
    failures: Arc<RwLock<usize>>,
}

impl InMemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().map(|o| o.clone()).unwrap_or_default()
    }

    /// Make the next `count` mutating calls fail with [`StoreError::Unavailable`]
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut failures) = self.failures.write() {
            *failures = count;
        }
    }

    /// Record the applier's view of a handle as fully observed
    pub fn set_health(&self, namespace: &str, name: &str, health: AppliedHealth) -> bool {
        let Ok(mut handles) = self.handles.write() else {
            return false;
        };
        let Some(entry) = handles.get_mut(&key(namespace, name)) else {
            return false;
        };

        let status = &mut entry.bundle.status;
        status.observed_generation = status.generation;
        status.conditions = match health {
            AppliedHealth::Healthy => vec![
                Condition::new(CONDITION_RESOURCES_APPLIED, true, "ApplySucceeded", None),
                Condition::new(CONDITION_RESOURCES_HEALTHY, true, "ResourcesHealthy", None),
            ],
            AppliedHealth::Unhealthy { reason, message } => vec![
                Condition::new(CONDITION_RESOURCES_APPLIED, true, "ApplySucceeded", None),
                Condition::new(CONDITION_RESOURCES_HEALTHY, false, &reason, Some(message)),
            ],
            AppliedHealth::NotApplied { reason, message } => vec![Condition::new(
                CONDITION_RESOURCES_APPLIED,
                false,
                &reason,
                Some(message),
            )],
        };
        true
    }

    /// Move a handle's first publish time, for overdue checks
    pub fn set_published_at(&self, namespace: &str, name: &str, at: DateTime<Utc>) {
        if let Ok(mut handles) = self.handles.write() {
            if let Some(entry) = handles.get_mut(&key(namespace, name)) {
                entry.bundle.published_at = Some(at);
            }
        }
    }

    /// Owner recorded for a handle
    pub fn owner(&self, namespace: &str, name: &str) -> Option<Owner> {
        self.handles
            .read()
            .ok()?
            .get(&key(namespace, name))
            .map(|e| e.owner.clone())
    }

    /// Names of all handles in a namespace, sorted
    pub fn handle_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .handles
            .read()
            .map(|h| {
                h.keys()
                    .filter(|(ns, _)| ns == namespace)
                    .map(|(_, name)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn record(&self, f: impl FnOnce(&mut OperationCounts)) {
        if let Ok(mut ops) = self.operations.write() {
            f(&mut ops);
        }
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        let Ok(mut failures) = self.failures.write() else {
            return Ok(());
        };
        if *failures > 0 {
            *failures -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("store lock poisoned".to_string())
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    async fn publish(&self, namespace: &str, bundle: &Bundle, owner: &Owner) -> Result<(), StoreError> {
        self.record(|o| o.publishes += 1);
        self.injected_failure()?;

        let name = bundle.kind().handle_name();
        let mut handles = self.handles.write().map_err(|_| Self::poisoned())?;
        match handles.get_mut(&key(namespace, name)) {
            Some(entry) => {
                if entry.bundle.manifests != *bundle.manifests() {
                    entry.bundle.manifests = bundle.manifests().clone();
                    entry.bundle.status.generation += 1;
                }
                entry.owner = owner.clone();
            }
            None => {
                handles.insert(
                    key(namespace, name),
                    Entry {
                        bundle: PublishedBundle {
                            name: name.to_string(),
                            kind: Some(bundle.kind()),
                            status: BundleStatus {
                                generation: 1,
                                observed_generation: 0,
                                conditions: Vec::new(),
                            },
                            published_at: Some(Utc::now()),
                            manifests: bundle.manifests().clone(),
                        },
                        owner: owner.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn retract(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.record(|o| o.retracts += 1);
        self.injected_failure()?;

        let mut handles = self.handles.write().map_err(|_| Self::poisoned())?;
        handles.remove(&key(namespace, name));
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PublishedBundle>, StoreError> {
        self.record(|o| o.gets += 1);

        let handles = self.handles.read().map_err(|_| Self::poisoned())?;
        Ok(handles.get(&key(namespace, name)).map(|e| e.bundle.clone()))
    }
}
