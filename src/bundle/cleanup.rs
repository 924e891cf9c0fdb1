//! Cleanup bundle: reverts every host-level change of the configurator.
//!
//! The payload is fixed. It depends only on the cluster facts, never on the
//! provider configuration, so it can be rendered while an extension is being
//! deleted.

use crate::bundle::manifests::{self, NodeAgent};
use crate::bundle::{BuildError, Bundle, BundleKind, ClusterContext};
use crate::constants::CLEANER_NAME;
use std::collections::BTreeMap;

const CLEAN_SCRIPT: &str = include_str!("assets/clean-rsyslog.sh");

/// Render the cleanup bundle
pub fn build(cluster: &ClusterContext) -> Result<Bundle, BuildError> {
    let legacy_pod_security = cluster.legacy_pod_security_required();
    let mut bundle = Bundle::new(BundleKind::Cleanup);

    let agent = NodeAgent {
        component: CLEANER_NAME,
        init_container: "rsyslog-configuration-cleaner",
        pause_container: "pause-container",
        script: CLEAN_SCRIPT.to_string(),
        annotations: BTreeMap::new(),
        mounts: Vec::new(),
        tolerate_all_taints: false,
        service_account: legacy_pod_security,
    };
    bundle.insert(
        "daemonset.yaml",
        manifests::to_yaml("daemonset.yaml", &agent.daemon_set())?,
    );

    if legacy_pod_security {
        for (file, manifest) in manifests::pod_security_manifests(CLEANER_NAME, &["hostPath"]) {
            bundle.insert(file, manifests::to_yaml(file, &manifest)?);
        }
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn cluster(version: Version) -> ClusterContext {
        ClusterContext {
            kubernetes_version: version,
            project_name: "test".to_string(),
            shoot_name: "shoot".to_string(),
            shoot_uid: "uid".to_string(),
            psp_admission_disabled: false,
        }
    }

    #[test]
    fn test_cleanup_bundle_keys() {
        let bundle = build(&cluster(Version::new(1, 27, 2))).unwrap();
        let keys: Vec<_> = bundle.keys().collect();
        assert_eq!(keys, vec!["rsyslog-relp-configuration-cleaner_templates_daemonset.yaml"]);

        let daemonset = bundle.file("daemonset.yaml").unwrap();
        assert!(daemonset.contains("rm -f /host/etc/rsyslog.d/60-audit.conf"));
        assert!(!daemonset.contains("serviceAccountName"));
    }

    #[test]
    fn test_cleanup_bundle_with_legacy_pod_security() {
        let bundle = build(&cluster(Version::new(1, 24, 8))).unwrap();
        assert_eq!(bundle.len(), 5);
        assert!(bundle.file("psp.yaml").is_some());
        assert!(bundle
            .file("daemonset.yaml")
            .unwrap()
            .contains("serviceAccountName: rsyslog-relp-configuration-cleaner"));
    }
}
