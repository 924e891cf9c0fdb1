//! # Extension Spec
//!
//! The Extension request object. Its `providerConfig` is kept as raw JSON on the
//! wire and parsed into [`RsyslogRelpConfig`](crate::crd::RsyslogRelpConfig) at
//! reconcile time, so malformed configuration is reported on the object instead
//! of being rejected by the watch.

use crate::crd::RsyslogRelpConfig;
use crate::bundle::BuildError;
use serde::{Deserialize, Serialize};

/// Extension Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: extensions.gardener.cloud/v1alpha1
/// kind: Extension
/// metadata:
///   name: shoot-rsyslog-relp
///   namespace: shoot--project--cluster
/// spec:
///   type: shoot-rsyslog-relp
///   providerConfig:
///     target: rsyslog.example.com
///     port: 443
///     loggingRules:
///     - severity: 5
///       programNames: ["systemd", "audisp-syslog"]
///     - severity: 2
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Extension",
    group = "extensions.gardener.cloud",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ExtensionStatus",
    shortname = "ext",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSpec {
    /// Extension type, selects the controller responsible for this object
    #[serde(rename = "type")]
    pub extension_type: String,
    /// Raw provider configuration for the extension
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::preserve_unknown_fields")]
    pub provider_config: Option<serde_json::Value>,
}

impl Extension {
    /// Parse the raw provider configuration
    ///
    /// A missing `providerConfig` is an input error: the extension cannot forward
    /// logs without at least a target.
    pub fn rsyslog_config(&self) -> Result<RsyslogRelpConfig, BuildError> {
        let raw = self
            .spec
            .provider_config
            .clone()
            .ok_or_else(|| BuildError::invalid("providerConfig", "must be set"))?;
        serde_json::from_value(raw)
            .map_err(|e| BuildError::invalid("providerConfig", e.to_string()))
    }

    /// Whether the object carries the given finalizer
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    /// Whether deletion of the object has been requested
    pub fn deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
