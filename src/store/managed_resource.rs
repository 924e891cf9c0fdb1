//! ManagedResource-backed bundle store.
//!
//! Each handle is a `ManagedResource` referencing an immutable Opaque Secret
//! `managedresource-<handle>-<digest>` whose data maps manifest keys to YAML
//! documents. The digest covers the manifests, so new content yields a new
//! secret reference and the resource manager sees a new generation.
//!
//! Writes start from the object read back from the API server and overlay the
//! owned fields only, keeping finalizers, labels and owners set by others. A
//! `409 Conflict` re-reads the object and retries up to a configured bound.

use crate::bundle::{Bundle, BundleKind};
use crate::constants::{BUNDLE_KIND_LABEL, BUNDLE_SECRET_PREFIX, FIELD_MANAGER};
use crate::crd::{ManagedResource, ManagedResourceSpec, SecretReference};
use crate::fingerprint;
use crate::store::{BundleStatus, BundleStore, Owner, PublishedBundle, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info};

const PUBLISHED_AT_ANNOTATION: &str = "rsyslog-relp.extensions.gardener.cloud/published-at";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const NO_CLEANUP_LABEL: &str = "shoot.gardener.cloud/no-cleanup";

/// Reads and writes of one object type in one namespace
#[async_trait]
pub trait ObjectApi<K: Send + Sync>: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Option<K>, kube::Error>;

    async fn create_object(&self, object: &K) -> Result<K, kube::Error>;

    /// Replace an object, guarded by the resourceVersion it carries
    async fn replace_object(&self, name: &str, object: &K) -> Result<K, kube::Error>;

    /// Delete an object, `false` when it was already gone
    async fn delete_object(&self, name: &str) -> Result<bool, kube::Error>;
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl<K> ObjectApi<K> for Api<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn fetch(&self, name: &str) -> Result<Option<K>, kube::Error> {
        self.get_opt(name).await
    }

    async fn create_object(&self, object: &K) -> Result<K, kube::Error> {
        self.create(&post_params(), object).await
    }

    async fn replace_object(&self, name: &str, object: &K) -> Result<K, kube::Error> {
        self.replace(name, &post_params(), object).await
    }

    async fn delete_object(&self, name: &str) -> Result<bool, kube::Error> {
        match self.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Bundle store over `ManagedResource` objects
#[derive(Clone)]
pub struct ManagedResourceStore {
    client: Client,
    conflict_retries: u32,
}

impl std::fmt::Debug for ManagedResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedResourceStore")
            .field("conflict_retries", &self.conflict_retries)
            .finish_non_exhaustive()
    }
}

impl ManagedResourceStore {
    pub fn new(client: Client, conflict_retries: u32) -> Self {
        Self {
            client,
            conflict_retries,
        }
    }

    fn apis(&self, namespace: &str) -> (Api<Secret>, Api<ManagedResource>) {
        (
            Api::namespaced(self.client.clone(), namespace),
            Api::namespaced(self.client.clone(), namespace),
        )
    }
}

fn metadata(name: &str, namespace: &str, kind: BundleKind, owner: &Owner) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([
            (BUNDLE_KIND_LABEL.to_string(), kind.as_str().to_string()),
            (MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string()),
        ])),
        annotations: Some(BTreeMap::from([(
            PUBLISHED_AT_ANNOTATION.to_string(),
            Utc::now().to_rfc3339(),
        )])),
        owner_references: Some(vec![OwnerReference {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]),
        ..Default::default()
    }
}

/// Name of the secret holding a handle's manifests, unique per content
fn secret_name(handle: &str, manifests: &BTreeMap<String, String>) -> String {
    let mut content = String::new();
    for (key, manifest) in manifests {
        content.push_str(key);
        content.push('\0');
        content.push_str(manifest);
        content.push('\0');
    }
    let digest = fingerprint::digest(&content);
    format!("{BUNDLE_SECRET_PREFIX}{handle}-{}", &digest[..8])
}

/// Owned metadata laid over what the API server holds
///
/// Foreign labels, annotations, finalizers and non-controller owners survive.
/// The first publish time is kept.
fn overlay_metadata(existing: &ObjectMeta, desired: &ObjectMeta) -> ObjectMeta {
    let mut meta = existing.clone();

    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .extend(desired.labels.clone().unwrap_or_default());

    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
    for (key, value) in desired.annotations.iter().flatten() {
        if key == PUBLISHED_AT_ANNOTATION && annotations.contains_key(key) {
            continue;
        }
        annotations.insert(key.clone(), value.clone());
    }

    let ours: Vec<OwnerReference> = desired.owner_references.clone().unwrap_or_default();
    let mut owners: Vec<OwnerReference> = existing
        .owner_references
        .iter()
        .flatten()
        .filter(|r| r.controller != Some(true) && !ours.iter().any(|o| o.uid == r.uid))
        .cloned()
        .collect();
    owners.extend(ours);
    meta.owner_references = Some(owners);

    meta
}

fn overlay_secret(existing: &Secret, desired: &Secret) -> Secret {
    Secret {
        metadata: overlay_metadata(&existing.metadata, &desired.metadata),
        data: desired.data.clone(),
        type_: desired.type_.clone(),
        immutable: desired.immutable,
        ..existing.clone()
    }
}

fn overlay_managed_resource(existing: &ManagedResource, desired: &ManagedResource) -> ManagedResource {
    ManagedResource {
        metadata: overlay_metadata(&existing.metadata, &desired.metadata),
        spec: desired.spec.clone(),
        status: existing.status.clone(),
    }
}

/// Create an object or overlay it onto the current one, retrying on conflicts
async fn upsert<K>(
    api: &dyn ObjectApi<K>,
    desired: &K,
    retries: u32,
    overlay: fn(&K, &K) -> K,
) -> Result<K, StoreError>
where
    K: Resource + Send + Sync,
{
    let name = desired.name_any();

    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = match api.fetch(&name).await? {
            Some(existing) => api.replace_object(&name, &overlay(&existing, desired)).await,
            None => api.create_object(desired).await,
        };

        match result {
            Ok(object) => return Ok(object),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                if attempts > retries {
                    return Err(StoreError::Conflict { name, attempts });
                }
                debug!(name = %name, attempt = attempts, "Conflict while publishing, re-reading");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn publish_bundle(
    secrets: &dyn ObjectApi<Secret>,
    managed_resources: &dyn ObjectApi<ManagedResource>,
    namespace: &str,
    bundle: &Bundle,
    owner: &Owner,
    retries: u32,
) -> Result<(), StoreError> {
    let kind = bundle.kind();
    let handle = kind.handle_name();
    let secret_name = secret_name(handle, bundle.manifests());
    let previous = managed_resources.fetch(handle).await?;

    let secret = Secret {
        metadata: metadata(&secret_name, namespace, kind, owner),
        type_: Some("Opaque".to_string()),
        immutable: Some(true),
        data: Some(
            bundle
                .manifests()
                .iter()
                .map(|(key, content)| (key.clone(), ByteString(content.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    };
    upsert(secrets, &secret, retries, overlay_secret).await?;

    let managed_resource = ManagedResource {
        metadata: metadata(handle, namespace, kind, owner),
        spec: ManagedResourceSpec {
            secret_refs: vec![SecretReference {
                name: secret_name.clone(),
            }],
            inject_labels: Some(BTreeMap::from([(
                NO_CLEANUP_LABEL.to_string(),
                "true".to_string(),
            )])),
            keep_objects: Some(false),
            class: None,
        },
        status: None,
    };
    upsert(managed_resources, &managed_resource, retries, overlay_managed_resource).await?;

    // Secrets of earlier content are no longer referenced
    for stale in previous
        .iter()
        .flat_map(|mr| mr.spec.secret_refs.iter())
        .filter(|r| r.name != secret_name)
    {
        if secrets.delete_object(&stale.name).await? {
            debug!(namespace = %namespace, secret = %stale.name, "Deleted superseded manifest secret");
        }
    }

    info!(namespace = %namespace, handle = %handle, manifests = bundle.len(), "Published bundle");
    Ok(())
}

async fn retract_bundle(
    secrets: &dyn ObjectApi<Secret>,
    managed_resources: &dyn ObjectApi<ManagedResource>,
    namespace: &str,
    name: &str,
) -> Result<(), StoreError> {
    let Some(managed_resource) = managed_resources.fetch(name).await? else {
        return Ok(());
    };

    let deleted = managed_resources.delete_object(name).await?;
    for secret in &managed_resource.spec.secret_refs {
        secrets.delete_object(&secret.name).await?;
    }

    if deleted {
        info!(namespace = %namespace, handle = %name, "Retracted bundle");
    }
    Ok(())
}

async fn read_bundle(
    secrets: &dyn ObjectApi<Secret>,
    managed_resources: &dyn ObjectApi<ManagedResource>,
    name: &str,
) -> Result<Option<PublishedBundle>, StoreError> {
    let Some(managed_resource) = managed_resources.fetch(name).await? else {
        return Ok(None);
    };

    let mut manifests = BTreeMap::new();
    for secret in &managed_resource.spec.secret_refs {
        let data = secrets
            .fetch(&secret.name)
            .await?
            .and_then(|s| s.data)
            .unwrap_or_default();
        manifests.extend(
            data.into_iter()
                .map(|(key, value)| (key, String::from_utf8_lossy(&value.0).into_owned())),
        );
    }

    let status = managed_resource.status.clone().unwrap_or_default();
    Ok(Some(PublishedBundle {
        name: name.to_string(),
        kind: managed_resource
            .labels()
            .get(BUNDLE_KIND_LABEL)
            .and_then(|v| BundleKind::from_label(v)),
        status: BundleStatus {
            generation: managed_resource.metadata.generation.unwrap_or(0),
            observed_generation: status.observed_generation,
            conditions: status.conditions,
        },
        published_at: managed_resource
            .annotations()
            .get(PUBLISHED_AT_ANNOTATION)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc)),
        manifests,
    }))
}

#[async_trait]
impl BundleStore for ManagedResourceStore {
    async fn publish(&self, namespace: &str, bundle: &Bundle, owner: &Owner) -> Result<(), StoreError> {
        let (secrets, managed_resources) = self.apis(namespace);
        publish_bundle(
            &secrets,
            &managed_resources,
            namespace,
            bundle,
            owner,
            self.conflict_retries,
        )
        .await
    }

    async fn retract(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let (secrets, managed_resources) = self.apis(namespace);
        retract_bundle(&secrets, &managed_resources, namespace, name).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PublishedBundle>, StoreError> {
        let (secrets, managed_resources) = self.apis(namespace);
        read_bundle(&secrets, &managed_resources, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{self as bundles, BundleRequest, ClusterContext};
    use kube::error::ErrorResponse;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    const NAMESPACE: &str = "shoot--dev--local";

    /// Objects kept the way the API server keeps them: resourceVersion guarded
    /// replaces and a generation that follows `spec`
    struct FakeObjects<K> {
        objects: Mutex<BTreeMap<String, K>>,
        conflicts: AtomicU32,
        writes: AtomicU32,
        versions: AtomicU64,
    }

    fn conflict(name: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("operation cannot be fulfilled on {name}"),
            reason: "Conflict".to_string(),
            code: 409,
        })
    }

    impl<K: Resource + Clone + Serialize> FakeObjects<K> {
        fn new() -> Self {
            Self {
                objects: Mutex::new(BTreeMap::new()),
                conflicts: AtomicU32::new(0),
                writes: AtomicU32::new(0),
                versions: AtomicU64::new(0),
            }
        }

        /// Reject the next `count` writes with 409
        fn conflict_next(&self, count: u32) {
            self.conflicts.store(count, Ordering::SeqCst);
        }

        fn writes(&self) -> u32 {
            self.writes.load(Ordering::SeqCst)
        }

        fn stored(&self, name: &str) -> Option<K> {
            self.objects.lock().unwrap().get(name).cloned()
        }

        fn names(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }

        fn update(&self, name: &str, change: impl FnOnce(&mut K)) {
            let mut objects = self.objects.lock().unwrap();
            change(objects.get_mut(name).unwrap());
        }

        fn injected_conflict(&self, name: &str) -> Result<(), kube::Error> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let pending = self.conflicts.load(Ordering::SeqCst);
            if pending > 0 {
                self.conflicts.store(pending - 1, Ordering::SeqCst);
                return Err(conflict(name));
            }
            Ok(())
        }

        fn next_version(&self) -> String {
            (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
        }
    }

    fn spec_of<K: Serialize>(object: &K) -> serde_json::Value {
        serde_json::to_value(object).unwrap()["spec"].clone()
    }

    #[async_trait]
    impl<K> ObjectApi<K> for FakeObjects<K>
    where
        K: Resource + Clone + Serialize + Send + Sync,
    {
        async fn fetch(&self, name: &str) -> Result<Option<K>, kube::Error> {
            Ok(self.stored(name))
        }

        async fn create_object(&self, object: &K) -> Result<K, kube::Error> {
            let name = object.name_any();
            self.injected_conflict(&name)?;
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(&name) {
                return Err(conflict(&name));
            }
            let mut created = object.clone();
            created.meta_mut().resource_version = Some(self.next_version());
            created.meta_mut().generation = Some(1);
            objects.insert(name, created.clone());
            Ok(created)
        }

        async fn replace_object(&self, name: &str, object: &K) -> Result<K, kube::Error> {
            self.injected_conflict(name)?;
            let mut objects = self.objects.lock().unwrap();
            let Some(current) = objects.get(name) else {
                return Err(kube::Error::Api(ErrorResponse {
                    status: "Failure".to_string(),
                    message: format!("{name} not found"),
                    reason: "NotFound".to_string(),
                    code: 404,
                }));
            };
            if current.resource_version() != object.resource_version() {
                return Err(conflict(name));
            }
            let generation = current.meta().generation.unwrap_or(1);
            let spec_changed = spec_of(current) != spec_of(object);

            let mut replaced = object.clone();
            replaced.meta_mut().resource_version = Some(self.next_version());
            replaced.meta_mut().generation =
                Some(if spec_changed { generation + 1 } else { generation });
            objects.insert(name.to_string(), replaced.clone());
            Ok(replaced)
        }

        async fn delete_object(&self, name: &str) -> Result<bool, kube::Error> {
            Ok(self.objects.lock().unwrap().remove(name).is_some())
        }
    }

    fn owner() -> Owner {
        Owner {
            api_version: "extensions.gardener.cloud/v1alpha1".to_string(),
            kind: "Extension".to_string(),
            name: "shoot-rsyslog-relp".to_string(),
            uid: "uid-1".to_string(),
        }
    }

    fn cleanup(version: &str) -> Bundle {
        let cluster = ClusterContext {
            kubernetes_version: semver::Version::parse(version).unwrap(),
            project_name: "dev".to_string(),
            shoot_name: "local".to_string(),
            shoot_uid: "8b1f1c0e-4a2b-4c47-9d0d-1c3d5e7f9a11".to_string(),
            psp_admission_disabled: false,
        };
        bundles::build(BundleRequest::Cleanup, &cluster).unwrap()
    }

    struct Fakes {
        secrets: FakeObjects<Secret>,
        managed_resources: FakeObjects<ManagedResource>,
    }

    impl Fakes {
        fn new() -> Self {
            Self {
                secrets: FakeObjects::new(),
                managed_resources: FakeObjects::new(),
            }
        }

        async fn publish(&self, bundle: &Bundle, retries: u32) -> Result<(), StoreError> {
            publish_bundle(
                &self.secrets,
                &self.managed_resources,
                NAMESPACE,
                bundle,
                &owner(),
                retries,
            )
            .await
        }

        async fn get(&self, name: &str) -> Option<PublishedBundle> {
            read_bundle(&self.secrets, &self.managed_resources, name)
                .await
                .unwrap()
        }
    }

    #[test]
    fn test_secret_name_follows_content() {
        let handle = "extension-shoot-rsyslog-relp-configuration-cleaner-shoot";
        let current = cleanup("1.27.2");
        let legacy = cleanup("1.24.0");

        let name = secret_name(handle, current.manifests());
        assert!(name.starts_with("managedresource-extension-shoot-rsyslog-relp-configuration-cleaner-shoot-"));
        assert_eq!(name.len(), BUNDLE_SECRET_PREFIX.len() + handle.len() + 9);
        assert_eq!(name, secret_name(handle, cleanup("1.27.2").manifests()));
        assert_ne!(name, secret_name(handle, legacy.manifests()));
    }

    #[test]
    fn test_metadata_carries_owner_and_kind() {
        let meta = metadata("h", "ns", BundleKind::Cleanup, &owner());
        assert_eq!(meta.labels.unwrap()[BUNDLE_KIND_LABEL], "cleanup");
        let owner_ref = &meta.owner_references.unwrap()[0];
        assert_eq!(owner_ref.uid, "uid-1");
        assert_eq!(owner_ref.controller, Some(true));
        assert!(meta.annotations.unwrap().contains_key(PUBLISHED_AT_ANNOTATION));
    }

    #[test]
    fn test_overlay_replaces_stale_controller_owner() {
        let existing = ObjectMeta {
            owner_references: Some(vec![
                OwnerReference {
                    api_version: "extensions.gardener.cloud/v1alpha1".to_string(),
                    kind: "Extension".to_string(),
                    name: "shoot-rsyslog-relp".to_string(),
                    uid: "uid-0".to_string(),
                    controller: Some(true),
                    block_owner_deletion: Some(true),
                },
                OwnerReference {
                    api_version: "v1".to_string(),
                    kind: "ConfigMap".to_string(),
                    name: "keeper".to_string(),
                    uid: "uid-keeper".to_string(),
                    controller: None,
                    block_owner_deletion: None,
                },
            ]),
            ..Default::default()
        };
        let desired = metadata("h", NAMESPACE, BundleKind::Cleanup, &owner());

        let merged = overlay_metadata(&existing, &desired);
        let uids: Vec<_> = merged
            .owner_references
            .unwrap()
            .into_iter()
            .map(|r| r.uid)
            .collect();
        assert_eq!(uids, vec!["uid-keeper", "uid-1"]);
    }

    #[tokio::test]
    async fn test_publish_retries_after_conflict() {
        let fakes = Fakes::new();
        let bundle = cleanup("1.27.2");
        fakes.publish(&bundle, 5).await.unwrap();

        fakes.managed_resources.conflict_next(1);
        let before = fakes.managed_resources.writes();
        fakes.publish(&cleanup("1.24.0"), 5).await.unwrap();

        // One rejected replace, one accepted after re-reading
        assert_eq!(fakes.managed_resources.writes() - before, 2);
        let published = fakes.get(bundle.kind().handle_name()).await.unwrap();
        assert!(published.manifests.keys().any(|k| k.ends_with("psp.yaml")));
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_bounded_conflicts() {
        let fakes = Fakes::new();
        fakes.managed_resources.conflict_next(10);

        let err = fakes.publish(&cleanup("1.27.2"), 2).await.unwrap_err();
        match err {
            StoreError::Conflict { name, attempts } => {
                assert_eq!(name, BundleKind::Cleanup.handle_name());
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fakes.managed_resources.writes(), 3);
    }

    #[tokio::test]
    async fn test_republish_keeps_foreign_metadata_and_bumps_generation() {
        let fakes = Fakes::new();
        let handle = BundleKind::Cleanup.handle_name();
        fakes.publish(&cleanup("1.24.0"), 5).await.unwrap();
        let first = fakes.get(handle).await.unwrap();
        assert_eq!(first.status.generation, 1);

        fakes.managed_resources.update(handle, |mr| {
            mr.metadata.finalizers = Some(vec!["resources.gardener.cloud/gardener-resource-manager".to_string()]);
            mr.labels_mut()
                .insert("resources.gardener.cloud/origin".to_string(), "seed".to_string());
        });

        fakes.publish(&cleanup("1.27.2"), 5).await.unwrap();

        let stored = fakes.managed_resources.stored(handle).unwrap();
        assert_eq!(
            stored.finalizers(),
            &["resources.gardener.cloud/gardener-resource-manager".to_string()]
        );
        assert_eq!(stored.labels()["resources.gardener.cloud/origin"], "seed");
        assert_eq!(stored.labels()[BUNDLE_KIND_LABEL], "cleanup");
        assert_eq!(stored.owner_references().len(), 1);

        let second = fakes.get(handle).await.unwrap();
        assert_eq!(second.status.generation, 2);
        assert_eq!(second.published_at, first.published_at);
        assert!(!second.manifests.keys().any(|k| k.ends_with("psp.yaml")));

        // Only the secret of the current content remains
        assert_eq!(
            fakes.secrets.names(),
            vec![stored.spec.secret_refs[0].name.clone()]
        );
    }

    #[tokio::test]
    async fn test_unchanged_republish_keeps_generation() {
        let fakes = Fakes::new();
        let handle = BundleKind::Cleanup.handle_name();
        fakes.publish(&cleanup("1.27.2"), 5).await.unwrap();
        fakes.publish(&cleanup("1.27.2"), 5).await.unwrap();

        assert_eq!(fakes.get(handle).await.unwrap().status.generation, 1);
        assert_eq!(fakes.secrets.names().len(), 1);
    }

    #[tokio::test]
    async fn test_retract_deletes_referenced_secrets() {
        let fakes = Fakes::new();
        let handle = BundleKind::Cleanup.handle_name();
        fakes.publish(&cleanup("1.27.2"), 5).await.unwrap();

        retract_bundle(&fakes.secrets, &fakes.managed_resources, NAMESPACE, handle)
            .await
            .unwrap();
        assert!(fakes.get(handle).await.is_none());
        assert!(fakes.secrets.names().is_empty());

        // Retracting a missing handle succeeds
        retract_bundle(&fakes.secrets, &fakes.managed_resources, NAMESPACE, handle)
            .await
            .unwrap();
    }
}
