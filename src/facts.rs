//! # Cluster Facts
//!
//! Resolves the [`ClusterContext`] of an extension from the cluster-scoped
//! `Cluster` object named after the extension's namespace.

use crate::bundle::ClusterContext;
use crate::crd::Cluster;
use async_trait::async_trait;
use kube::{Api, Client};
use semver::Version;
use serde_json::Value;
use thiserror::Error;

/// Namespace prefix of Gardener project namespaces
const PROJECT_NAMESPACE_PREFIX: &str = "garden-";
const PSP_ADMISSION_PLUGIN: &str = "PodSecurityPolicy";

#[derive(Debug, Error)]
pub enum FactsError {
    #[error("cluster {0} not found")]
    NotFound(String),
    #[error("cluster {name} is malformed at {field}: {reason}")]
    Malformed {
        name: String,
        field: &'static str,
        reason: String,
    },
    #[error("failed to read cluster: {0}")]
    Kube(#[from] kube::Error),
}

/// Source of cluster facts
#[async_trait]
pub trait ClusterFactsProvider: Send + Sync {
    /// Facts of the cluster an extension namespace belongs to
    async fn cluster_context(&self, namespace: &str) -> Result<ClusterContext, FactsError>;
}

/// Reads facts from `Cluster` objects
#[derive(Clone)]
pub struct KubeClusterFacts {
    client: Client,
}

impl std::fmt::Debug for KubeClusterFacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterFacts").finish_non_exhaustive()
    }
}

impl KubeClusterFacts {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterFactsProvider for KubeClusterFacts {
    async fn cluster_context(&self, namespace: &str) -> Result<ClusterContext, FactsError> {
        let api: Api<Cluster> = Api::all(self.client.clone());
        let cluster = api
            .get_opt(namespace)
            .await?
            .ok_or_else(|| FactsError::NotFound(namespace.to_string()))?;
        cluster_context_from(&cluster)
    }
}

/// Extract the rendering facts from a `Cluster` object
pub fn cluster_context_from(cluster: &Cluster) -> Result<ClusterContext, FactsError> {
    let name = cluster.metadata.name.clone().unwrap_or_default();
    let shoot = &cluster.spec.shoot;
    let malformed = |field: &'static str, reason: &str| FactsError::Malformed {
        name: name.clone(),
        field,
        reason: reason.to_string(),
    };

    let version = string_at(shoot, &["spec", "kubernetes", "version"])
        .ok_or_else(|| malformed("shoot.spec.kubernetes.version", "missing"))?;
    let kubernetes_version = Version::parse(version.trim_start_matches('v'))
        .map_err(|e| malformed("shoot.spec.kubernetes.version", &e.to_string()))?;

    let shoot_name = string_at(shoot, &["metadata", "name"])
        .ok_or_else(|| malformed("shoot.metadata.name", "missing"))?;
    let shoot_namespace = string_at(shoot, &["metadata", "namespace"])
        .ok_or_else(|| malformed("shoot.metadata.namespace", "missing"))?;
    let shoot_uid = string_at(shoot, &["metadata", "uid"])
        .ok_or_else(|| malformed("shoot.metadata.uid", "missing"))?;

    let project_name = shoot_namespace
        .strip_prefix(PROJECT_NAMESPACE_PREFIX)
        .unwrap_or(shoot_namespace);

    Ok(ClusterContext {
        kubernetes_version,
        project_name: project_name.to_string(),
        shoot_name: shoot_name.to_string(),
        shoot_uid: shoot_uid.to_string(),
        psp_admission_disabled: psp_admission_disabled(shoot),
    })
}

fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_str)
}

fn psp_admission_disabled(shoot: &Value) -> bool {
    shoot
        .pointer("/spec/kubernetes/kubeAPIServer/admissionPlugins")
        .and_then(Value::as_array)
        .is_some_and(|plugins| {
            plugins.iter().any(|plugin| {
                plugin.get("name").and_then(Value::as_str) == Some(PSP_ADMISSION_PLUGIN)
                    && plugin.get("disabled").and_then(Value::as_bool) == Some(true)
            })
        })
}
