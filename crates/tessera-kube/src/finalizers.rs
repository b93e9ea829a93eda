//! Finalizer access for any namespaced API object.

use std::fmt::Debug;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde_json::json;

use tessera_reconcile::{FinalizerClient, FinalizerState, ResourceResult};

use crate::error::KubeStoreError;

/// [`FinalizerClient`] over a kube [`Api`].
///
/// Writes are merge patches carrying the read `resourceVersion`, so the
/// API server rejects them with 409 when the object moved.
pub struct ApiFinalizerClient<K> {
    api: Api<K>,
}

impl<K> ApiFinalizerClient<K> {
    pub fn new(api: Api<K>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<K> FinalizerClient for ApiFinalizerClient<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn get_finalizers(&self, name: &str) -> ResourceResult<FinalizerState> {
        let object = self
            .api
            .get(name)
            .await
            .map_err(|e| KubeStoreError::from_api(name, e))?;
        let meta = object.meta();
        Ok(FinalizerState {
            finalizers: meta.finalizers.clone().unwrap_or_default(),
            resource_version: meta.resource_version.clone(),
        })
    }

    async fn set_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<&str>,
    ) -> ResourceResult<()> {
        let patch = finalizer_patch(&finalizers, resource_version);
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| KubeStoreError::from_api(name, e))?;
        Ok(())
    }
}

fn finalizer_patch(finalizers: &[String], resource_version: Option<&str>) -> serde_json::Value {
    match resource_version {
        Some(rv) => json!({ "metadata": { "finalizers": finalizers, "resourceVersion": rv } }),
        None => json!({ "metadata": { "finalizers": finalizers } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_carries_version() {
        let patch = finalizer_patch(&["a".to_string()], Some("42"));
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["metadata"]["finalizers"][0], "a");

        let unversioned = finalizer_patch(&[], None);
        assert!(unversioned["metadata"].get("resourceVersion").is_none());
        assert_eq!(unversioned["metadata"]["finalizers"], json!([]));
    }
}
