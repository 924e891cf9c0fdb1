//! Value-tree builders shared by both bundle kinds.

use crate::bundle::{BuildError, SecretMaterial};
use crate::constants::{ALPINE_IMAGE, PAUSE_IMAGE, PRIORITY_CLASS_NAME, TARGET_NAMESPACE};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Optional parts of a bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sections {
    pub tls: bool,
    pub audit: bool,
    pub legacy_pod_security: bool,
}

/// Serialize a manifest tree to a YAML document
pub(crate) fn to_yaml(file: &str, manifest: &Value) -> Result<String, BuildError> {
    serde_yaml::to_string(manifest).map_err(|source| BuildError::Serialize {
        name: file.to_string(),
        source,
    })
}

pub(crate) fn labels(component: &str) -> Value {
    json!({
        "app.kubernetes.io/name": component,
        "app.kubernetes.io/instance": component,
    })
}

pub(crate) fn config_map(name: &str, data: &BTreeMap<&str, String>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": TARGET_NAMESPACE,
        },
        "data": data,
    })
}

pub(crate) fn tls_secret(name: &str, secret: &SecretMaterial) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": TARGET_NAMESPACE,
        },
        "type": "Opaque",
        "data": {
            "ca.crt": STANDARD.encode(&secret.ca),
            "tls.crt": STANDARD.encode(&secret.crt),
            "tls.key": STANDARD.encode(&secret.key),
        },
    })
}

/// Volume mounted into the init container
#[derive(Debug, Clone)]
pub(crate) struct Mount {
    pub name: String,
    pub path: String,
    pub source: Value,
}

impl Mount {
    pub fn config_map(name: impl Into<String>, path: impl Into<String>, config_map: &str) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source: json!({ "configMap": { "name": config_map } }),
        }
    }

    pub fn secret(name: impl Into<String>, path: impl Into<String>, secret: &str) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source: json!({ "secret": { "secretName": secret } }),
        }
    }
}

/// A privileged DaemonSet that runs one script against the host and then idles
#[derive(Debug, Clone)]
pub(crate) struct NodeAgent<'a> {
    pub component: &'a str,
    pub init_container: &'a str,
    pub pause_container: &'a str,
    pub script: String,
    pub annotations: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub tolerate_all_taints: bool,
    pub service_account: bool,
}

impl NodeAgent<'_> {
    pub fn daemon_set(&self) -> Value {
        let mut volume_mounts: Vec<Value> = self
            .mounts
            .iter()
            .map(|m| json!({ "name": m.name, "mountPath": m.path }))
            .collect();
        volume_mounts.push(json!({ "name": "host-root-volume", "mountPath": "/host", "readOnly": false }));

        let mut volumes: Vec<Value> = self
            .mounts
            .iter()
            .map(|m| {
                let mut volume = json!({ "name": m.name });
                if let (Some(volume), Some(source)) = (volume.as_object_mut(), m.source.as_object()) {
                    volume.extend(source.clone());
                }
                volume
            })
            .collect();
        volumes.push(json!({ "name": "host-root-volume", "hostPath": { "path": "/" } }));

        let mut pod_spec = json!({
            "securityContext": { "seccompProfile": { "type": "RuntimeDefault" } },
            "priorityClassName": PRIORITY_CLASS_NAME,
            "containers": [{
                "name": self.pause_container,
                "image": PAUSE_IMAGE,
                "imagePullPolicy": "IfNotPresent",
            }],
            "initContainers": [{
                "name": self.init_container,
                "image": ALPINE_IMAGE,
                "imagePullPolicy": "IfNotPresent",
                "command": ["sh", "-c", self.script],
                "resources": {
                    "requests": { "memory": "8Mi", "cpu": "2m" },
                    "limits": { "memory": "16Mi" },
                },
                "volumeMounts": volume_mounts,
            }],
            "hostPID": true,
            "volumes": volumes,
        });
        if self.tolerate_all_taints {
            pod_spec["tolerations"] = json!([
                { "effect": "NoSchedule", "operator": "Exists" },
                { "effect": "NoExecute", "operator": "Exists" },
            ]);
        }
        if self.service_account {
            pod_spec["serviceAccountName"] = json!(self.component);
        }

        let mut template_metadata = json!({ "labels": labels(self.component) });
        if !self.annotations.is_empty() {
            template_metadata["annotations"] = json!(self.annotations);
        }

        json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": {
                "name": self.component,
                "namespace": TARGET_NAMESPACE,
                "labels": labels(self.component),
            },
            "spec": {
                "selector": { "matchLabels": labels(self.component) },
                "template": {
                    "metadata": template_metadata,
                    "spec": pod_spec,
                },
            },
        })
    }
}

/// Manifests granting a component the use of its PodSecurityPolicy
///
/// `policy/v1beta1` is gone from current API bindings, so these stay plain value trees.
pub(crate) fn pod_security_manifests(component: &str, volume_types: &[&str]) -> Vec<(&'static str, Value)> {
    let policy_name = format!("gardener.kube-system.{component}");
    let role_name = format!("gardener.cloud:psp:kube-system:{component}");

    let psp = json!({
        "apiVersion": "policy/v1beta1",
        "kind": "PodSecurityPolicy",
        "metadata": {
            "name": policy_name,
            "annotations": {
                "seccomp.security.alpha.kubernetes.io/defaultProfileName": "runtime/default",
                "seccomp.security.alpha.kubernetes.io/allowedProfileNames": "runtime/default",
            },
        },
        "spec": {
            "hostPID": true,
            "volumes": volume_types,
            "allowedHostPaths": [{ "pathPrefix": "/" }],
            "readOnlyRootFilesystem": true,
            "runAsUser": { "rule": "RunAsAny" },
            "seLinux": { "rule": "RunAsAny" },
            "supplementalGroups": { "rule": "RunAsAny" },
            "fsGroup": { "rule": "RunAsAny" },
        },
    });

    let cluster_role = json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "ClusterRole",
        "metadata": { "name": role_name },
        "rules": [{
            "apiGroups": ["policy", "extensions"],
            "resourceNames": [policy_name],
            "resources": ["podsecuritypolicies"],
            "verbs": ["use"],
        }],
    });

    let role_binding = json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "RoleBinding",
        "metadata": {
            "name": format!("gardener.cloud:psp:{component}"),
            "namespace": TARGET_NAMESPACE,
        },
        "roleRef": {
            "apiGroup": "rbac.authorization.k8s.io",
            "kind": "ClusterRole",
            "name": role_name,
        },
        "subjects": [{
            "kind": "ServiceAccount",
            "name": component,
            "namespace": TARGET_NAMESPACE,
        }],
    });

    let service_account = json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": {
            "name": component,
            "namespace": TARGET_NAMESPACE,
            "labels": labels(component),
        },
        "automountServiceAccountToken": false,
    });

    vec![
        ("psp.yaml", psp),
        ("clusterrole-psp.yaml", cluster_role),
        ("rolebinding-psp.yaml", role_binding),
        ("serviceaccount.yaml", service_account),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> NodeAgent<'static> {
        NodeAgent {
            component: "agent",
            init_container: "agent-init",
            pause_container: "pause",
            script: "echo hi\n".to_string(),
            annotations: BTreeMap::new(),
            mounts: vec![Mount::config_map("config-volume", "/etc/agent", "agent-config")],
            tolerate_all_taints: false,
            service_account: false,
        }
    }

    #[test]
    fn test_daemon_set_volumes_and_mounts_pair_up() {
        let ds = agent().daemon_set();
        let pod = &ds["spec"]["template"]["spec"];
        assert_eq!(pod["volumes"][0]["configMap"]["name"], "agent-config");
        assert_eq!(pod["volumes"][0]["name"], "config-volume");
        assert_eq!(pod["volumes"][1]["hostPath"]["path"], "/");
        assert_eq!(pod["initContainers"][0]["volumeMounts"][0]["mountPath"], "/etc/agent");
        assert_eq!(pod["initContainers"][0]["volumeMounts"][1]["mountPath"], "/host");
        assert!(pod.get("serviceAccountName").is_none());
        assert!(pod.get("tolerations").is_none());
        assert!(ds["spec"]["template"]["metadata"].get("annotations").is_none());
    }

    #[test]
    fn test_daemon_set_optional_fields() {
        let mut agent = agent();
        agent.service_account = true;
        agent.tolerate_all_taints = true;
        agent.annotations.insert("checksum/x".to_string(), "abc".to_string());
        let ds = agent.daemon_set();
        let pod = &ds["spec"]["template"]["spec"];
        assert_eq!(pod["serviceAccountName"], "agent");
        assert_eq!(pod["tolerations"].as_array().map(Vec::len), Some(2));
        assert_eq!(ds["spec"]["template"]["metadata"]["annotations"]["checksum/x"], "abc");
    }

    #[test]
    fn test_tls_secret_is_base64_encoded() {
        let secret = tls_secret("tls", &SecretMaterial::new("ca", "crt", "key"));
        assert_eq!(secret["data"]["ca.crt"], "Y2E=");
        assert_eq!(secret["data"]["tls.crt"], "Y3J0");
        assert_eq!(secret["data"]["tls.key"], "a2V5");
    }

    #[test]
    fn test_pod_security_manifests_reference_each_other() {
        let manifests = pod_security_manifests("agent", &["hostPath"]);
        let files: Vec<_> = manifests.iter().map(|(file, _)| *file).collect();
        assert_eq!(
            files,
            vec!["psp.yaml", "clusterrole-psp.yaml", "rolebinding-psp.yaml", "serviceaccount.yaml"]
        );
        let (_, role) = &manifests[1];
        assert_eq!(role["rules"][0]["resourceNames"][0], "gardener.kube-system.agent");
        let (_, binding) = &manifests[2];
        assert_eq!(binding["roleRef"]["name"], "gardener.cloud:psp:kube-system:agent");
    }
}
