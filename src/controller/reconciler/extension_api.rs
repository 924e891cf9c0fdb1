//! # Extension API
//!
//! Writes the reconciler performs on the Extension itself: the finalizer and
//! the status subresource.

use crate::constants::{FIELD_MANAGER, FINALIZER};
use crate::crd::{Extension, ExtensionStatus};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;

#[async_trait]
pub trait ExtensionApi: Send + Sync {
    /// Add the controller's finalizer, a no-op when already present
    async fn add_finalizer(&self, extension: &Extension) -> Result<(), kube::Error>;

    /// Remove the controller's finalizer, a no-op when absent
    async fn remove_finalizer(&self, extension: &Extension) -> Result<(), kube::Error>;

    async fn patch_status(
        &self,
        extension: &Extension,
        status: &ExtensionStatus,
    ) -> Result<(), kube::Error>;
}

#[derive(Clone)]
pub struct KubeExtensionApi {
    client: Client,
}

impl std::fmt::Debug for KubeExtensionApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeExtensionApi").finish_non_exhaustive()
    }
}

impl KubeExtensionApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, extension: &Extension) -> Api<Extension> {
        Api::namespaced(
            self.client.clone(),
            extension.namespace().as_deref().unwrap_or("default"),
        )
    }

    async fn patch_finalizers(
        &self,
        extension: &Extension,
        finalizers: Vec<String>,
    ) -> Result<(), kube::Error> {
        // resourceVersion makes the merge patch fail on a concurrent finalizer change
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": extension.resource_version(),
            }
        });
        match self
            .api(extension)
            .patch(
                &extension.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await
        {
            Ok(_) => Ok(()),
            // Object already gone after the last finalizer was dropped elsewhere
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ExtensionApi for KubeExtensionApi {
    async fn add_finalizer(&self, extension: &Extension) -> Result<(), kube::Error> {
        if extension.has_finalizer(FINALIZER) {
            return Ok(());
        }
        let mut finalizers = extension.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        self.patch_finalizers(extension, finalizers).await
    }

    async fn remove_finalizer(&self, extension: &Extension) -> Result<(), kube::Error> {
        if !extension.has_finalizer(FINALIZER) {
            return Ok(());
        }
        let finalizers = extension
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        self.patch_finalizers(extension, finalizers).await
    }

    async fn patch_status(
        &self,
        extension: &Extension,
        status: &ExtensionStatus,
    ) -> Result<(), kube::Error> {
        let patch = json!({ "status": status });
        self.api(extension)
            .patch_status(
                &extension.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await?;
        Ok(())
    }
}
