//! # ManagedResource
//!
//! A set of manifests, stored in referenced secrets, that an external resource
//! manager applies to the target cluster. Its status reports whether the
//! manifests were applied and whether the resulting objects are healthy.

use crate::crd::Condition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition type set once all manifests were applied
pub const CONDITION_RESOURCES_APPLIED: &str = "ResourcesApplied";

/// Condition type set once all applied objects are healthy
pub const CONDITION_RESOURCES_HEALTHY: &str = "ResourcesHealthy";

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[kube(
    kind = "ManagedResource",
    group = "resources.gardener.cloud",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ManagedResourceStatus",
    shortname = "mr"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceSpec {
    /// Secrets holding the manifests, keyed by manifest name
    pub secret_refs: Vec<SecretReference>,
    /// Labels injected into every applied object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_labels: Option<BTreeMap<String, String>>,
    /// Whether applied objects survive deletion of the ManagedResource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_objects: Option<bool>,
    /// Resource manager class, unset targets the shoot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct SecretReference {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: i64,
}
