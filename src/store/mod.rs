//! # Bundle Publisher
//!
//! Persists rendered bundles as named handles that an external applier
//! reconciles onto the target cluster, and reads back the applier's status.
//!
//! - **managed_resource**: `ManagedResource` + Secret pairs through the Kubernetes API
//! - **memory**: In-memory store used by tests
//! - **credentials**: Resolution of the TLS material referenced by an extension

mod credentials;
mod managed_resource;
pub mod memory;

pub use credentials::{CredentialError, CredentialResolver, KubeCredentialResolver};
pub use managed_resource::ManagedResourceStore;
pub use memory::InMemoryBundleStore;

use crate::bundle::{Bundle, BundleKind};
use crate::crd::{CONDITION_RESOURCES_APPLIED, CONDITION_RESOURCES_HEALTHY, Condition, Extension};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from the bundle store, all of them retriable
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict publishing {name}, gave up after {attempts} attempts")]
    Conflict { name: String, attempts: u32 },
    #[error("bundle store unavailable: {0}")]
    Unavailable(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Object a published handle is owned by
///
/// Owner references let the API server garbage collect handles whose extension is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl Owner {
    pub fn of(extension: &Extension) -> Self {
        Self {
            api_version: "extensions.gardener.cloud/v1alpha1".to_string(),
            kind: "Extension".to_string(),
            name: extension.name_any(),
            uid: extension.uid().unwrap_or_default(),
        }
    }
}

/// Applier-reported status of a published handle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleStatus {
    pub generation: i64,
    pub observed_generation: i64,
    pub conditions: Vec<Condition>,
}

impl BundleStatus {
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    pub fn applied(&self) -> Option<&Condition> {
        self.condition(CONDITION_RESOURCES_APPLIED)
    }

    pub fn healthy(&self) -> Option<&Condition> {
        self.condition(CONDITION_RESOURCES_HEALTHY)
    }
}

/// A handle read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedBundle {
    pub name: String,
    pub kind: Option<BundleKind>,
    pub status: BundleStatus,
    /// When the handle was first published
    pub published_at: Option<DateTime<Utc>>,
    pub manifests: BTreeMap<String, String>,
}

/// Store of published bundles
///
/// Publishing is an idempotent upsert keyed by the bundle kind's handle name;
/// retracting a missing handle succeeds.
#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn publish(&self, namespace: &str, bundle: &Bundle, owner: &Owner) -> Result<(), StoreError>;

    async fn retract(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PublishedBundle>, StoreError>;

    /// Whether a handle exists
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.get(namespace, name).await?.is_some())
    }
}
