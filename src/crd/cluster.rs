//! # Cluster
//!
//! The cluster-scoped `Cluster` object describing a shoot, its seed and cloud
//! profile. The controller only reads it; the embedded objects are kept raw and
//! the few facts needed for rendering are extracted by
//! [`crate::facts::cluster_context_from`].

use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Cluster",
    group = "extensions.gardener.cloud",
    version = "v1alpha1"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// The shoot this cluster object describes
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub shoot: serde_json::Value,
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub seed: Option<serde_json::Value>,
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub cloud_profile: Option<serde_json::Value>,
}
