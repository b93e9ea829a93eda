//! [`PodInterface`] over the Kubernetes API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Secret};
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use tessera_pod::constants::LABEL_DEPLOYMENT;
use tessera_reconcile::{ClusterSnapshot, PodInterface, ResourceResult, remove_finalizers};

use crate::error::KubeStoreError;
use crate::finalizers::ApiFinalizerClient;

/// Pods, claims and secrets of one deployment in one namespace.
pub struct KubePods {
    deployment: String,
    pods: Api<Pod>,
    pvcs: Api<PersistentVolumeClaim>,
    secrets: Api<Secret>,
}

impl KubePods {
    pub fn new(client: Client, namespace: &str, deployment: &str) -> Self {
        Self {
            deployment: deployment.to_string(),
            pods: Api::namespaced(client.clone(), namespace),
            pvcs: Api::namespaced(client.clone(), namespace),
            secrets: Api::namespaced(client, namespace),
        }
    }

    fn selector(&self) -> ListParams {
        ListParams::default().labels(&format!("{LABEL_DEPLOYMENT}={}", self.deployment))
    }
}

#[async_trait]
impl PodInterface for KubePods {
    async fn snapshot(&self) -> ResourceResult<ClusterSnapshot> {
        let params = self.selector();
        let pods = self
            .pods
            .list(&params)
            .await
            .map_err(KubeStoreError::Api)?;
        let pvcs = self
            .pvcs
            .list(&params)
            .await
            .map_err(KubeStoreError::Api)?;
        Ok(ClusterSnapshot {
            pods: pods.items,
            pvcs: pvcs.items,
        })
    }

    async fn create_pod(&self, pod: Pod) -> ResourceResult<Pod> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let created = self
            .pods
            .create(&PostParams::default(), &pod)
            .await
            .map_err(|e| KubeStoreError::from_api(&name, e))?;
        info!(deployment = %self.deployment, pod = %name, "pod created");
        Ok(created)
    }

    async fn delete_pod(&self, name: &str) -> ResourceResult<()> {
        match self.pods.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(deployment = %self.deployment, pod = %name, "pod deleted");
                Ok(())
            }
            Err(e) => match KubeStoreError::from_api(name, e) {
                KubeStoreError::NotFound(_) => {
                    debug!(pod = %name, "pod already gone");
                    Ok(())
                }
                other => Err(other.into()),
            },
        }
    }

    async fn update_pod_image(&self, name: &str, container: &str, image: &str) -> ResourceResult<()> {
        let patch = json!({
            "spec": { "containers": [ { "name": container, "image": image } ] }
        });
        self.pods
            .patch(name, &PatchParams::default(), &Patch::Strategic(&patch))
            .await
            .map_err(|e| KubeStoreError::from_api(name, e))?;
        info!(deployment = %self.deployment, pod = %name, %image, "pod image updated");
        Ok(())
    }

    async fn remove_pod_finalizers(&self, name: &str, finalizers: &[String]) -> ResourceResult<()> {
        let client = ApiFinalizerClient::new(self.pods.clone());
        let removed = remove_finalizers(&client, name, finalizers, true).await?;
        if removed > 0 {
            debug!(pod = %name, removed, "pod finalizers removed");
        }
        Ok(())
    }

    async fn encryption_key_hashes(&self, secret: &str) -> ResourceResult<Vec<String>> {
        let object = self
            .secrets
            .get(secret)
            .await
            .map_err(|e| KubeStoreError::from_api(secret, e))?;
        Ok(key_hashes(object.data.as_ref()))
    }
}

/// Sorted sha256 hex digests of every key stored in a secret.
pub fn key_hashes(data: Option<&BTreeMap<String, ByteString>>) -> Vec<String> {
    let mut hashes: Vec<String> = data
        .map(|d| {
            d.values()
                .map(|v| hex::encode(Sha256::digest(&v.0)))
                .collect()
        })
        .unwrap_or_default();
    hashes.sort();
    hashes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_sorted_digests() {
        let mut data = BTreeMap::new();
        data.insert("b".to_string(), ByteString(b"second".to_vec()));
        data.insert("a".to_string(), ByteString(b"first".to_vec()));

        let hashes = key_hashes(Some(&data));
        assert_eq!(hashes.len(), 2);
        assert!(hashes[0] < hashes[1]);
        assert!(hashes.contains(&hex::encode(Sha256::digest(b"first"))));
        assert_eq!(hashes[0].len(), 64);
    }

    #[test]
    fn empty_secret_has_no_hashes() {
        assert!(key_hashes(None).is_empty());
        assert!(key_hashes(Some(&BTreeMap::new())).is_empty());
    }
}
