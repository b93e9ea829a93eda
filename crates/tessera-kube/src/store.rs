//! [`StatusStore`] backed by `DatabaseDeployment` custom resources.
//!
//! The object's `resourceVersion` is the store version. Status writes go
//! to the status subresource, spec writes to the main resource; both
//! carry the version that was read, so the API server does the
//! compare-and-swap. A spec write starts from the stored object so labels,
//! annotations, finalizers and owner references survive.

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use serde_json::json;
use tracing::debug;

use tessera_state::{DeploymentSpec, DeploymentStatus, StateResult, StatusStore, Versioned};

use crate::crd::DatabaseDeployment;
use crate::error::{KubeStoreError, KubeStoreResult};

#[derive(Clone)]
pub struct KubeStatusStore {
    api: Api<DatabaseDeployment>,
}

impl KubeStatusStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }

    /// Names of all deployments in the namespace.
    pub async fn list_names(&self) -> KubeStoreResult<Vec<String>> {
        let list = self
            .api
            .list(&Default::default())
            .await
            .map_err(KubeStoreError::Api)?;
        Ok(list.items.into_iter().filter_map(|d| d.metadata.name).collect())
    }

    pub async fn get(&self, name: &str) -> KubeStoreResult<DatabaseDeployment> {
        self.api
            .get(name)
            .await
            .map_err(|e| KubeStoreError::from_api(name, e))
    }
}

fn resource_version(object: &DatabaseDeployment, name: &str) -> KubeStoreResult<String> {
    object
        .meta()
        .resource_version
        .clone()
        .ok_or_else(|| KubeStoreError::NotFound(format!("{name} resourceVersion")))
}

/// `existing` with its spec replaced, provided it is still at `version`.
fn with_spec(
    mut existing: DatabaseDeployment,
    name: &str,
    version: &str,
    spec: &DeploymentSpec,
) -> KubeStoreResult<DatabaseDeployment> {
    let current = resource_version(&existing, name)?;
    if current != version {
        return Err(KubeStoreError::Conflict(format!(
            "{name}: version {version} is stale, now {current}"
        )));
    }
    existing.spec.deployment = spec.clone();
    Ok(existing)
}

#[async_trait]
impl StatusStore for KubeStatusStore {
    async fn read(&self, name: &str) -> StateResult<Versioned> {
        let object = self.get(name).await?;
        let version = resource_version(&object, name)?;
        Ok(Versioned {
            spec: object.spec.deployment,
            status: object.status.unwrap_or_default(),
            version,
        })
    }

    async fn compare_and_swap_status(
        &self,
        name: &str,
        version: &str,
        status: &DeploymentStatus,
    ) -> StateResult<String> {
        let body = json!({
            "apiVersion": DatabaseDeployment::api_version(&()),
            "kind": DatabaseDeployment::kind(&()),
            "metadata": { "name": name, "resourceVersion": version },
            "status": status,
        });
        let data = serde_json::to_vec(&body).map_err(KubeStoreError::Serialize)?;
        let updated = self
            .api
            .replace_status(name, &PostParams::default(), data)
            .await
            .map_err(|e| KubeStoreError::from_api(name, e))?;
        let new_version = resource_version(&updated, name)?;
        debug!(deployment = %name, version = %new_version, "status written");
        Ok(new_version)
    }

    async fn compare_and_swap_spec(
        &self,
        name: &str,
        version: &str,
        spec: &DeploymentSpec,
    ) -> StateResult<String> {
        let object = with_spec(self.get(name).await?, name, version, spec)?;
        let updated = self
            .api
            .replace(name, &PostParams::default(), &object)
            .await
            .map_err(|e| KubeStoreError::from_api(name, e))?;
        Ok(resource_version(&updated, name)?)
    }
}
