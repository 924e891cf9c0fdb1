//! # Bundle Builder
//!
//! Renders the manifests deployed to a target cluster. Rendering is a pure
//! function of the provider configuration, the cluster facts and the resolved
//! TLS material: equal inputs always produce byte-identical bundles, which keeps
//! publishing idempotent and makes the content fingerprints stable.
//!
//! Two kinds of bundle exist:
//! - **Configuration**: installs the rsyslog configurator DaemonSet and its configuration
//! - **Cleanup**: a DaemonSet that undoes every host-level change of the configurator
//!
//! Manifests are built as value trees (`serde_json::Value`), conditional parts are
//! selected by [`Sections`], and each tree is serialized to YAML exactly once.

pub mod cleanup;
pub mod configuration;
mod context;
mod manifests;
pub mod rsyslog;

pub use context::{ClusterContext, SecretMaterial};
pub use manifests::Sections;

use crate::constants::{CLEANER_NAME, CLEANUP_HANDLE_NAME, CONFIGURATION_HANDLE_NAME, CONFIGURATOR_NAME};
use crate::crd::RsyslogRelpConfig;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while building a bundle
#[derive(Debug, Error)]
pub enum BuildError {
    /// Operator input error, never retried
    #[error("invalid configuration at {path}: {reason}")]
    InvalidConfiguration { path: String, reason: String },
    #[error("failed to serialize manifest {name}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl BuildError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BuildError::InvalidConfiguration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Field path of an invalid configuration, empty for other errors
    pub fn path(&self) -> &str {
        match self {
            BuildError::InvalidConfiguration { path, .. } => path,
            BuildError::Serialize { .. } => "",
        }
    }
}

/// Kind of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BundleKind {
    Configuration,
    Cleanup,
}

impl BundleKind {
    /// Component name used as the manifest key prefix
    pub fn component_name(self) -> &'static str {
        match self {
            BundleKind::Configuration => CONFIGURATOR_NAME,
            BundleKind::Cleanup => CLEANER_NAME,
        }
    }

    /// Name of the published handle for this kind
    pub fn handle_name(self) -> &'static str {
        match self {
            BundleKind::Configuration => CONFIGURATION_HANDLE_NAME,
            BundleKind::Cleanup => CLEANUP_HANDLE_NAME,
        }
    }

    /// Label value identifying the kind on published handles
    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::Configuration => "configuration",
            BundleKind::Cleanup => "cleanup",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "configuration" => Some(BundleKind::Configuration),
            "cleanup" => Some(BundleKind::Cleanup),
            _ => None,
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable key of a manifest within a published bundle
///
/// Consumers locate rendered manifests by this key, so the format is part of the
/// external contract: `{component}_templates_{file}`.
pub fn manifest_key(kind: BundleKind, file: &str) -> String {
    format!("{}_templates_{}", kind.component_name(), file)
}

/// A rendered, immutable set of manifests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    kind: BundleKind,
    manifests: BTreeMap<String, String>,
}

impl Bundle {
    fn new(kind: BundleKind) -> Self {
        Self {
            kind,
            manifests: BTreeMap::new(),
        }
    }

    fn insert(&mut self, file: &str, content: String) {
        self.manifests.insert(manifest_key(self.kind, file), content);
    }

    pub fn kind(&self) -> BundleKind {
        self.kind
    }

    /// Manifest content by full key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.manifests.get(key).map(String::as_str)
    }

    /// Manifest content by file name within this bundle's component
    pub fn file(&self, file: &str) -> Option<&str> {
        self.get(&manifest_key(self.kind, file))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.manifests.keys().map(String::as_str)
    }

    pub fn manifests(&self) -> &BTreeMap<String, String> {
        &self.manifests
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

/// What to build
#[derive(Debug, Clone, Copy)]
pub enum BundleRequest<'a> {
    /// The forwarder configuration for an active extension
    Configuration {
        config: &'a RsyslogRelpConfig,
        secret: Option<&'a SecretMaterial>,
    },
    /// The fixed host cleanup payload
    Cleanup,
}

impl BundleRequest<'_> {
    pub fn kind(&self) -> BundleKind {
        match self {
            BundleRequest::Configuration { .. } => BundleKind::Configuration,
            BundleRequest::Cleanup => BundleKind::Cleanup,
        }
    }
}

/// Build a bundle
pub fn build(request: BundleRequest<'_>, cluster: &ClusterContext) -> Result<Bundle, BuildError> {
    match request {
        BundleRequest::Configuration { config, secret } => {
            configuration::build(config, cluster, secret)
        }
        BundleRequest::Cleanup => cleanup::build(cluster),
    }
}
