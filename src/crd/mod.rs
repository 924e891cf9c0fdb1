//! # Custom Resource Definitions
//!
//! CRD types consumed and produced by the rsyslog RELP controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Extension` request object watched by the controller
//! - `provider_config.rs` - The rsyslog RELP provider configuration carried by an Extension
//! - `status.rs` - Status types for tracking lifecycle phase and conditions
//! - `cluster.rs` - The `Cluster` object describing the target shoot
//! - `managed_resource.rs` - The `ManagedResource` object a published bundle is stored as

mod cluster;
mod managed_resource;
mod provider_config;
mod spec;
mod status;

pub use cluster::{Cluster, ClusterSpec};
pub use managed_resource::{
    ManagedResource, ManagedResourceSpec, ManagedResourceStatus, SecretReference,
    CONDITION_RESOURCES_APPLIED, CONDITION_RESOURCES_HEALTHY,
};
pub use provider_config::{
    AuditConfig, AuthMode, LoggingRule, RsyslogRelpConfig, Tls, TlsLib,
};
pub use spec::{Extension, ExtensionSpec};
pub use status::{Condition, ExtensionStatus};

use schemars::{Schema, SchemaGenerator};

/// Schema for embedded objects whose structure is validated by the controller at runtime
///
/// Kubernetes structural schemas cannot describe arbitrary nested objects, so the
/// field is marked with `x-kubernetes-preserve-unknown-fields`.
pub(crate) fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}
