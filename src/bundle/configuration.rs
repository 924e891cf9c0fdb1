//! Configuration bundle: installs the rsyslog RELP forwarder on every node.

use crate::bundle::manifests::{self, Mount, NodeAgent};
use crate::bundle::rsyslog::RsyslogConfig;
use crate::bundle::{BuildError, Bundle, BundleKind, ClusterContext, SecretMaterial, Sections};
use crate::constants::{CONFIGURATOR_NAME, HOST_CONFIG_DIR};
use crate::crd::RsyslogRelpConfig;
use crate::fingerprint;
use std::collections::BTreeMap;

pub const CONFIG_MAP_NAME: &str = "rsyslog-relp-configurator-config";
pub const AUDITD_CONFIG_MAP_NAME: &str = "rsyslog-relp-configurator-auditd-config";
pub const TLS_SECRET_NAME: &str = "rsyslog-relp-configurator-tls";

const CONFIGURE_SCRIPT: &str = include_str!("assets/configure-rsyslog.sh");
const PSTATS_SCRIPT: &str = include_str!("assets/process_rsyslog_pstats.sh");
const SYSTEMD_UNIT: &str = include_str!("assets/rsyslog-configurator.service");
const AUDIT_RULES_DIR: &str = "/etc/audit/rules.d";
const AUDIT_SYSLOG_PLUGIN: &str = "/etc/audit/plugins.d/syslog.conf";

const AUDIT_RULES: [(&str, &str); 5] = [
    ("00-base-config.rules", include_str!("assets/00-base-config.rules")),
    ("10-privilege-escalation.rules", include_str!("assets/10-privilege-escalation.rules")),
    ("11-privileged-special.rules", include_str!("assets/11-privileged-special.rules")),
    ("12-system-integrity.rules", include_str!("assets/12-system-integrity.rules")),
    (
        "configured-by-rsyslog-relp-configurator",
        include_str!("assets/configured-by-rsyslog-relp-configurator"),
    ),
];

/// Render the configuration bundle
///
/// TLS material is required when TLS is enabled and ignored otherwise.
pub fn build(
    config: &RsyslogRelpConfig,
    cluster: &ClusterContext,
    secret: Option<&SecretMaterial>,
) -> Result<Bundle, BuildError> {
    config.validate()?;

    let sections = Sections {
        tls: config.enabled_tls().is_some(),
        audit: config.audit_enabled(),
        legacy_pod_security: cluster.legacy_pod_security_required(),
    };
    let secret = if sections.tls {
        Some(secret.ok_or_else(|| {
            BuildError::invalid(
                "providerConfig.tls.secretReferenceName",
                "TLS is enabled but no TLS material was resolved",
            )
        })?)
    } else {
        None
    };

    let mut bundle = Bundle::new(BundleKind::Configuration);
    let mut annotations = BTreeMap::new();

    let data = BTreeMap::from([
        ("rsyslog-configurator.service", SYSTEMD_UNIT.to_string()),
        ("configure-rsyslog.sh", CONFIGURE_SCRIPT.to_string()),
        ("process_rsyslog_pstats.sh", PSTATS_SCRIPT.to_string()),
        ("60-audit.conf", RsyslogConfig::forwarder(config, cluster).to_string()),
    ]);
    let config_map = manifests::to_yaml(
        "configmap.yaml",
        &manifests::config_map(CONFIG_MAP_NAME, &data),
    )?;
    annotations.insert(
        fingerprint::annotation_key(CONFIGURATOR_NAME, "config"),
        fingerprint::digest(&config_map),
    );
    bundle.insert("configmap.yaml", config_map);

    if sections.audit {
        let data: BTreeMap<&str, String> = AUDIT_RULES
            .iter()
            .map(|(file, rules)| (*file, (*rules).to_string()))
            .collect();
        let auditd = manifests::to_yaml(
            "auditd-config.yaml",
            &manifests::config_map(AUDITD_CONFIG_MAP_NAME, &data),
        )?;
        annotations.insert(
            fingerprint::annotation_key(CONFIGURATOR_NAME, "auditd-config"),
            fingerprint::digest(&auditd),
        );
        bundle.insert("auditd-config.yaml", auditd);
    }

    if let Some(secret) = secret {
        let tls = manifests::to_yaml("tls.yaml", &manifests::tls_secret(TLS_SECRET_NAME, secret))?;
        annotations.insert(
            fingerprint::annotation_key(CONFIGURATOR_NAME, "tls"),
            fingerprint::digest(&tls),
        );
        bundle.insert("tls.yaml", tls);
    }

    let mut mounts = Vec::new();
    if sections.tls {
        mounts.push(Mount::secret(
            format!("{CONFIGURATOR_NAME}-tls-volume"),
            format!("{HOST_CONFIG_DIR}/tls"),
            TLS_SECRET_NAME,
        ));
    }
    mounts.push(Mount::config_map(
        format!("{CONFIGURATOR_NAME}-config-volume"),
        format!("{HOST_CONFIG_DIR}/config"),
        CONFIG_MAP_NAME,
    ));
    if sections.audit {
        mounts.push(Mount::config_map(
            "auditd-config-volume",
            format!("{HOST_CONFIG_DIR}/audit/rules.d"),
            AUDITD_CONFIG_MAP_NAME,
        ));
    }

    let agent = NodeAgent {
        component: CONFIGURATOR_NAME,
        init_container: CONFIGURATOR_NAME,
        pause_container: "pause",
        script: install_script(sections),
        annotations,
        mounts,
        tolerate_all_taints: true,
        service_account: sections.legacy_pod_security,
    };
    bundle.insert(
        "daemonset.yaml",
        manifests::to_yaml("daemonset.yaml", &agent.daemon_set())?,
    );

    if sections.legacy_pod_security {
        for (file, manifest) in
            manifests::pod_security_manifests(CONFIGURATOR_NAME, &["hostPath", "secret", "configMap"])
        {
            bundle.insert(file, manifests::to_yaml(file, &manifest)?);
        }
    }

    Ok(bundle)
}

/// Init container script copying the configuration onto the host
fn install_script(sections: Sections) -> String {
    let dir = HOST_CONFIG_DIR;
    let mut lines = Vec::new();

    if sections.audit {
        lines.push(format!("mkdir -p /host{dir}/audit/rules.d"));
        lines.push(format!("cp -fL {dir}/audit/rules.d/* /host{dir}/audit/rules.d/"));
    } else {
        // Hand the audit setup of an earlier configuration back to the host
        lines.push(format!("rm -rf /host{dir}/audit"));
        lines.push(format!(
            "if [ -f /host{AUDIT_SYSLOG_PLUGIN} ]; then sed -i 's/yes/no/g' /host{AUDIT_SYSLOG_PLUGIN}; fi"
        ));
        lines.push(format!(
            "if [ -d /host{AUDIT_RULES_DIR}.original ]; then rm -rf /host{AUDIT_RULES_DIR}; mv /host{AUDIT_RULES_DIR}.original /host{AUDIT_RULES_DIR}; \
chroot /host /bin/bash -c 'if systemctl list-unit-files auditd.service > /dev/null; then augenrules --load; systemctl restart auditd; fi'; fi"
        ));
    }
    lines.push(format!("mkdir -p /host{dir}/rsyslog.d"));
    lines.push(format!("cp -fL {dir}/config/60-audit.conf /host{dir}/rsyslog.d/60-audit.conf"));
    if sections.tls {
        lines.push(format!("mkdir -p /host{dir}/tls"));
        lines.push(format!("cp -fL {dir}/tls/* /host{dir}/tls/"));
    }
    lines.push(format!("cp -fL {dir}/config/configure-rsyslog.sh /host{dir}/configure-rsyslog.sh"));
    lines.push(format!("chmod +x /host{dir}/configure-rsyslog.sh"));
    lines.push(format!(
        "cp -fL {dir}/config/rsyslog-configurator.service /host/etc/systemd/system/rsyslog-configurator.service"
    ));
    lines.push(
        "chroot /host /bin/bash -c \"systemctl enable rsyslog-configurator; systemctl start rsyslog-configurator\""
            .to_string(),
    );
    lines.push(format!(
        "cp -fL {dir}/config/process_rsyslog_pstats.sh /host{dir}/process_rsyslog_pstats.sh"
    ));
    lines.push(format!("chmod +x /host{dir}/process_rsyslog_pstats.sh"));

    let mut script = lines.join("\n");
    script.push('\n');
    script
}
