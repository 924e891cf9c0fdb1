//! Inputs describing the target cluster and the resolved TLS material.

use crate::constants::PSP_REMOVED_MINOR_VERSION;
use semver::Version;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Facts about the target cluster that influence rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterContext {
    pub kubernetes_version: Version,
    pub project_name: String,
    pub shoot_name: String,
    pub shoot_uid: String,
    /// Whether the PodSecurityPolicy admission plugin is explicitly disabled
    pub psp_admission_disabled: bool,
}

impl ClusterContext {
    /// Whether legacy pod-security manifests must accompany the workloads
    ///
    /// True only for clusters older than 1.25 that still run the
    /// PodSecurityPolicy admission plugin.
    pub fn legacy_pod_security_required(&self) -> bool {
        let removed = Version::new(1, PSP_REMOVED_MINOR_VERSION, 0);
        self.kubernetes_version < removed && !self.psp_admission_disabled
    }
}

/// TLS material for the RELP connection
///
/// Buffers are wiped when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial {
    pub ca: Vec<u8>,
    pub crt: Vec<u8>,
    pub key: Vec<u8>,
}

impl SecretMaterial {
    pub fn new(ca: impl Into<Vec<u8>>, crt: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            ca: ca.into(),
            crt: crt.into(),
            key: key.into(),
        }
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("ca", &format_args!("<{} bytes>", self.ca.len()))
            .field("crt", &format_args!("<{} bytes>", self.crt.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}
