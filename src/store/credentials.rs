//! Resolution of the TLS material for the RELP connection.
//!
//! A shoot resource reference named `<name>` is copied into the extension
//! namespace as the Secret `ref-<name>` with the keys `ca`, `crt` and `key`.

use crate::bundle::SecretMaterial;
use crate::constants::REFERENCED_RESOURCE_PREFIX;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use thiserror::Error;

const KEYS: [&str; 3] = ["ca", "crt", "key"];

#[derive(Debug, Error)]
pub enum CredentialError {
    /// The referenced secret has not been copied yet, retried
    #[error("referenced secret {0} not found")]
    NotFound(String),
    /// The referenced secret lacks a key, an operator input error
    #[error("referenced secret {secret} has no key {key}")]
    MissingKey { secret: String, key: &'static str },
    #[error("failed to read referenced secret: {0}")]
    Kube(#[from] kube::Error),
}

/// Source of TLS material
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, namespace: &str, reference: &str) -> Result<SecretMaterial, CredentialError>;
}

/// Reads referenced secrets from the extension namespace
#[derive(Clone)]
pub struct KubeCredentialResolver {
    client: Client,
}

impl std::fmt::Debug for KubeCredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCredentialResolver").finish_non_exhaustive()
    }
}

impl KubeCredentialResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialResolver for KubeCredentialResolver {
    async fn resolve(&self, namespace: &str, reference: &str) -> Result<SecretMaterial, CredentialError> {
        let name = format!("{REFERENCED_RESOURCE_PREFIX}{reference}");
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get_opt(&name)
            .await?
            .ok_or_else(|| CredentialError::NotFound(name.clone()))?;
        material_from(&name, secret)
    }
}

fn material_from(name: &str, secret: Secret) -> Result<SecretMaterial, CredentialError> {
    let mut data = secret.data.unwrap_or_default();
    let mut take = |key: &'static str| {
        data.remove(key)
            .map(|v| v.0)
            .ok_or_else(|| CredentialError::MissingKey {
                secret: name.to_string(),
                key,
            })
    };
    let [ca, crt, key] = KEYS;
    Ok(SecretMaterial::new(take(ca)?, take(crt)?, take(key)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn secret(keys: &[&str]) -> Secret {
        Secret {
            data: Some(
                keys.iter()
                    .map(|k| (k.to_string(), ByteString(k.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_material_from_complete_secret() {
        let material = material_from("ref-tls", secret(&["ca", "crt", "key"])).unwrap();
        assert_eq!(material.ca, b"ca");
        assert_eq!(material.crt, b"crt");
        assert_eq!(material.key, b"key");
    }

    #[test]
    fn test_material_from_secret_missing_key() {
        let err = material_from("ref-tls", secret(&["ca", "crt"])).unwrap_err();
        assert!(matches!(err, CredentialError::MissingKey { key: "key", .. }));
    }
}
