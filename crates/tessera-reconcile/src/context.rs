//! Per-deployment context shared by the builder, executor and actions.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use tokio::sync::RwLock;

use tessera_core::{FeatureSet, Timeouts};
use tessera_pod::{RenderContext, render_member_template};
use tessera_scaling::ScalingIntegration;
use tessera_state::{
    DeploymentEvent, DeploymentSpec, EventRecorder, MemberPodTemplate, MemberStatus, ServerGroup,
    StateResult, StatusStore, TimedStore, Versioned, with_status_update,
};

use crate::error::ResourceResult;

// ── Cluster snapshot ───────────────────────────────────────────────

/// Pods and claims of one deployment as listed at the start of a pass.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    pub pods: Vec<Pod>,
    pub pvcs: Vec<PersistentVolumeClaim>,
}

impl ClusterSnapshot {
    pub fn pod(&self, name: &str) -> Option<&Pod> {
        self.pods
            .iter()
            .find(|p| p.metadata.name.as_deref() == Some(name))
    }

    pub fn pvc(&self, name: &str) -> Option<&PersistentVolumeClaim> {
        self.pvcs
            .iter()
            .find(|p| p.metadata.name.as_deref() == Some(name))
    }

    pub fn member_pod(&self, member: &MemberStatus) -> Option<&Pod> {
        member.pod_name.as_deref().and_then(|n| self.pod(n))
    }

    pub fn member_pvc(&self, member: &MemberStatus) -> Option<&PersistentVolumeClaim> {
        member
            .persistent_volume_claim_name
            .as_deref()
            .and_then(|n| self.pvc(n))
    }
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|c| c.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
}

pub fn has_finalizer(pod: &Pod, finalizer: &str) -> bool {
    pod.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

// ── Pod boundary ───────────────────────────────────────────────────

/// Kubernetes objects of one deployment.
#[async_trait]
pub trait PodInterface: Send + Sync {
    async fn snapshot(&self) -> ResourceResult<ClusterSnapshot>;

    /// Create a pod and return it as stored, with its uid.
    async fn create_pod(&self, pod: Pod) -> ResourceResult<Pod>;

    /// Delete a pod. A missing pod is not an error.
    async fn delete_pod(&self, name: &str) -> ResourceResult<()>;

    async fn update_pod_image(&self, name: &str, container: &str, image: &str)
    -> ResourceResult<()>;

    async fn remove_pod_finalizers(&self, name: &str, finalizers: &[String])
    -> ResourceResult<()>;

    /// Hashes of the keys stored in an encryption secret.
    async fn encryption_key_hashes(&self, secret: &str) -> ResourceResult<Vec<String>>;
}

// ── Deployment context ─────────────────────────────────────────────

pub struct DeploymentContext {
    name: String,
    store: Arc<dyn StatusStore>,
    pods: Arc<dyn PodInterface>,
    events: Arc<dyn EventRecorder>,
    scaling: Option<Arc<ScalingIntegration>>,
    render: RenderContext,
    timeouts: Timeouts,
    snapshot: RwLock<Arc<ClusterSnapshot>>,
}

impl DeploymentContext {
    pub fn new(
        render: RenderContext,
        store: Arc<dyn StatusStore>,
        pods: Arc<dyn PodInterface>,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            name: render.deployment.clone(),
            store,
            pods,
            events,
            scaling: None,
            render,
            timeouts: Timeouts::default(),
            snapshot: RwLock::new(Arc::new(ClusterSnapshot::default())),
        }
    }

    pub fn with_scaling(mut self, scaling: Arc<ScalingIntegration>) -> Self {
        self.scaling = Some(scaling);
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &FeatureSet {
        &self.render.features
    }

    pub fn render(&self) -> &RenderContext {
        &self.render
    }

    pub fn scaling(&self) -> Option<&ScalingIntegration> {
        self.scaling.as_deref()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// The status store under the Kubernetes deadline.
    fn store(&self) -> TimedStore {
        TimedStore::new(self.store.clone(), self.timeouts.kubernetes())
    }

    pub async fn read(&self) -> StateResult<Versioned> {
        self.store().read(&self.name).await
    }

    pub async fn with_status_update<F>(&self, mutate: F) -> StateResult<bool>
    where
        F: FnMut(&mut tessera_state::DeploymentStatus) -> bool + Send,
    {
        with_status_update(&self.store(), &self.name, mutate).await
    }

    /// Current status of a member, with its group.
    pub async fn member_status_by_id(
        &self,
        id: &str,
    ) -> StateResult<Option<(ServerGroup, MemberStatus)>> {
        let current = self.read().await?;
        Ok(current
            .status
            .members
            .find(id)
            .map(|(g, m)| (g, m.clone())))
    }

    pub fn desired_template(
        &self,
        spec: &DeploymentSpec,
        group: ServerGroup,
        member: &MemberStatus,
    ) -> tessera_pod::PodResult<MemberPodTemplate> {
        render_member_template(&self.render, spec, group, member)
    }

    pub async fn record(&self, event: DeploymentEvent) {
        self.events.record(event).await;
    }

    // ── cluster objects ────────────────────────────────────────────

    /// Snapshot taken by the last [`refresh_snapshot`](Self::refresh_snapshot).
    pub async fn cached_snapshot(&self) -> Arc<ClusterSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn refresh_snapshot(&self) -> ResourceResult<Arc<ClusterSnapshot>> {
        let fresh = Arc::new(
            self.timeouts
                .kubernetes()
                .run(self.pods.snapshot())
                .await??,
        );
        *self.snapshot.write().await = fresh.clone();
        Ok(fresh)
    }

    pub async fn create_pod(&self, pod: Pod) -> ResourceResult<Pod> {
        self.timeouts.kubernetes().run(self.pods.create_pod(pod)).await?
    }

    pub async fn delete_pod(&self, name: &str) -> ResourceResult<()> {
        self.timeouts.kubernetes().run(self.pods.delete_pod(name)).await?
    }

    pub async fn update_pod_image(
        &self,
        name: &str,
        container: &str,
        image: &str,
    ) -> ResourceResult<()> {
        self.timeouts
            .kubernetes()
            .run(self.pods.update_pod_image(name, container, image))
            .await?
    }

    pub async fn remove_pod_finalizers(
        &self,
        name: &str,
        finalizers: &[String],
    ) -> ResourceResult<()> {
        self.timeouts
            .kubernetes()
            .run(self.pods.remove_pod_finalizers(name, finalizers))
            .await?
    }

    pub async fn encryption_key_hashes(&self, secret: &str) -> ResourceResult<Vec<String>> {
        self.timeouts
            .kubernetes()
            .run(self.pods.encryption_key_hashes(secret))
            .await?
    }
}
