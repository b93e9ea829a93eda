//! In-memory pod API and deployment fixtures for tests.
//!
//! [`MemoryPods`] behaves like a small API server: created pods get a uid
//! and (by default) turn ready at once, deleting a pod with finalizers only
//! marks it terminating, and removing the last finalizer of a terminating
//! pod deletes it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use tessera_core::FeatureSet;
use tessera_pod::RenderContext;
use tessera_state::{DeploymentSpec, MemoryEvents, ServerGroupSpec, StateStore};

use crate::context::{ClusterSnapshot, DeploymentContext, PodInterface};
use crate::error::{ResourceError, ResourceResult};
use crate::finalizers::{FinalizerClient, FinalizerState, remove_finalizers};

#[derive(Debug, Default)]
struct Cluster {
    pods: BTreeMap<String, Pod>,
    pvcs: Vec<PersistentVolumeClaim>,
    secrets: HashMap<String, Vec<String>>,
    next_uid: u64,
    hold_ready: bool,
    deleted: Vec<String>,
}

/// Pods of one deployment, held in memory.
#[derive(Debug, Default)]
pub struct MemoryPods {
    cluster: Mutex<Cluster>,
}

fn set_ready(pod: &mut Pod, ready: bool) {
    let status = pod.status.get_or_insert_with(PodStatus::default);
    status.conditions = Some(vec![PodCondition {
        type_: "Ready".to_string(),
        status: if ready { "True" } else { "False" }.to_string(),
        ..Default::default()
    }]);
}

impl MemoryPods {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Cluster> {
        self.cluster
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// New pods stay not ready until [`set_ready`](Self::set_ready).
    pub fn hold_ready(&self, hold: bool) {
        self.lock().hold_ready = hold;
    }

    pub fn set_ready(&self, name: &str, ready: bool) {
        if let Some(pod) = self.lock().pods.get_mut(name) {
            set_ready(pod, ready);
        }
    }

    pub fn set_encryption_keys(&self, secret: &str, keys: &[&str]) {
        self.lock().secrets.insert(
            secret.to_string(),
            keys.iter().map(|k| k.to_string()).collect(),
        );
    }

    pub fn add_pvc(&self, pvc: PersistentVolumeClaim) {
        self.lock().pvcs.push(pvc);
    }

    /// Put a pod in place as if someone else had created it.
    pub fn insert_pod(&self, pod: Pod) {
        if let Some(name) = pod.metadata.name.clone() {
            self.lock().pods.insert(name, pod);
        }
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.lock().pods.get(name).cloned()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.lock().pods.keys().cloned().collect()
    }

    pub fn pod_count(&self) -> usize {
        self.lock().pods.len()
    }

    /// Names passed to `delete_pod`, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }
}

#[async_trait]
impl FinalizerClient for MemoryPods {
    async fn get_finalizers(&self, name: &str) -> ResourceResult<FinalizerState> {
        let cluster = self.lock();
        let pod = cluster
            .pods
            .get(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        Ok(FinalizerState {
            finalizers: pod.metadata.finalizers.clone().unwrap_or_default(),
            resource_version: pod.metadata.resource_version.clone(),
        })
    }

    async fn set_finalizers(
        &self,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<&str>,
    ) -> ResourceResult<()> {
        let mut cluster = self.lock();
        let pod = cluster
            .pods
            .get_mut(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        if pod.metadata.resource_version.as_deref() != resource_version {
            return Err(ResourceError::Conflict(name.to_string()));
        }
        let gone = finalizers.is_empty() && pod.metadata.deletion_timestamp.is_some();
        pod.metadata.finalizers = Some(finalizers);
        bump_version(pod);
        if gone {
            cluster.pods.remove(name);
        }
        Ok(())
    }
}

fn bump_version(pod: &mut Pod) {
    let next = pod
        .metadata
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    pod.metadata.resource_version = Some(next.to_string());
}

#[async_trait]
impl PodInterface for MemoryPods {
    async fn snapshot(&self) -> ResourceResult<ClusterSnapshot> {
        let cluster = self.lock();
        Ok(ClusterSnapshot {
            pods: cluster.pods.values().cloned().collect(),
            pvcs: cluster.pvcs.clone(),
        })
    }

    async fn create_pod(&self, mut pod: Pod) -> ResourceResult<Pod> {
        let mut cluster = self.lock();
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| ResourceError::Api("pod without name".to_string()))?;
        if cluster.pods.contains_key(&name) {
            return Err(ResourceError::Conflict(name));
        }
        cluster.next_uid += 1;
        pod.metadata.uid = Some(format!("uid-{}", cluster.next_uid));
        pod.metadata.resource_version = Some("1".to_string());
        set_ready(&mut pod, !cluster.hold_ready);
        cluster.pods.insert(name, pod.clone());
        Ok(pod)
    }

    async fn delete_pod(&self, name: &str) -> ResourceResult<()> {
        let mut cluster = self.lock();
        cluster.deleted.push(name.to_string());
        let Some(pod) = cluster.pods.get_mut(name) else {
            return Ok(());
        };
        if pod.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            // The server process stops; the object waits for its finalizers.
            pod.metadata
                .deletion_timestamp
                .get_or_insert_with(|| Time(k8s_openapi::chrono::Utc::now()));
            set_ready(pod, false);
            bump_version(pod);
        } else {
            cluster.pods.remove(name);
        }
        Ok(())
    }

    async fn update_pod_image(&self, name: &str, container: &str, image: &str) -> ResourceResult<()> {
        let mut cluster = self.lock();
        let pod = cluster
            .pods
            .get_mut(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        let target = pod
            .spec
            .as_mut()
            .and_then(|s| s.containers.iter_mut().find(|c| c.name == container))
            .ok_or_else(|| ResourceError::Api(format!("{name}: no container {container}")))?;
        target.image = Some(image.to_string());
        bump_version(pod);
        Ok(())
    }

    async fn remove_pod_finalizers(&self, name: &str, finalizers: &[String]) -> ResourceResult<()> {
        remove_finalizers(self, name, finalizers, true).await?;
        Ok(())
    }

    async fn encryption_key_hashes(&self, secret: &str) -> ResourceResult<Vec<String>> {
        self.lock()
            .secrets
            .get(secret)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("secret {secret}")))
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

/// Cluster-mode spec with one member per group and coordinator bounds 1..=5.
pub fn small_cluster_spec() -> DeploymentSpec {
    DeploymentSpec {
        image: "arangodb/arangodb:3.11".to_string(),
        agents: ServerGroupSpec::with_count(1),
        dbservers: ServerGroupSpec::with_count(1),
        coordinators: ServerGroupSpec::with_count(1).with_bounds(1, 5),
        ..Default::default()
    }
}

/// A deployment wired to in-memory collaborators.
pub struct TestDeployment {
    pub ctx: DeploymentContext,
    pub store: StateStore,
    pub pods: Arc<MemoryPods>,
    pub events: Arc<MemoryEvents>,
}

impl TestDeployment {
    pub fn new(name: &str, spec: &DeploymentSpec) -> Self {
        Self::with_features(name, spec, FeatureSet::default())
    }

    pub fn with_features(name: &str, spec: &DeploymentSpec, features: FeatureSet) -> Self {
        let store = StateStore::open_in_memory().expect("in-memory store");
        store.put_deployment(name, spec).expect("seed deployment");
        let pods = Arc::new(MemoryPods::new());
        let events = Arc::new(MemoryEvents::new());
        let render = RenderContext::new(name, "default").with_features(features);
        let ctx = DeploymentContext::new(
            render,
            Arc::new(store.clone()),
            pods.clone(),
            events.clone(),
        );
        Self {
            ctx,
            store,
            pods,
            events,
        }
    }
}
