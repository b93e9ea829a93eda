//! Deployments of one namespace, read from `DatabaseDeployment` resources
//! or from a local state file. Pods always live in the namespace.

use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;

use tessera_core::{FeatureSet, OperatorConfig, Timeouts};
use tessera_kube::{KubeEvents, KubePods, KubeStatusStore};
use tessera_pod::RenderContext;
use tessera_pod::constants::DATABASE_PORT;
use tessera_pod::names::client_service_dns_name;
use tessera_reconcile::DeploymentContext;
use tessera_scaling::{HttpClusterAdmin, ScalingIntegration};
use tessera_state::{EventRecorder, LogEvents, StateStore, StatusStore};

use crate::deployment::DeploymentLoop;
use crate::operator::DeploymentSource;

/// Where specs and statuses are kept.
enum Deployments {
    Resources(KubeStatusStore),
    Local(StateStore),
}

pub struct KubeSource {
    client: Client,
    namespace: String,
    deployments: Deployments,
    config: OperatorConfig,
    timeouts: Timeouts,
    features: FeatureSet,
    instance: Option<String>,
}

impl KubeSource {
    pub fn new(client: Client, namespace: &str, config: OperatorConfig) -> anyhow::Result<Self> {
        let timeouts = config.timeouts()?;
        let features = config.feature_set()?;
        Ok(Self {
            deployments: Deployments::Resources(KubeStatusStore::new(client.clone(), namespace)),
            client,
            namespace: namespace.to_string(),
            config,
            timeouts,
            features,
            instance: std::env::var("POD_NAME").ok(),
        })
    }

    /// Take deployments from `store` instead of custom resources.
    pub fn with_local_state(mut self, store: StateStore) -> Self {
        self.deployments = Deployments::Local(store);
        self
    }

    fn events(&self) -> Arc<dyn EventRecorder> {
        match self.deployments {
            Deployments::Resources(_) => Arc::new(KubeEvents::new(
                self.client.clone(),
                &self.namespace,
                self.instance.clone(),
            )),
            // No object to attach events to.
            Deployments::Local(_) => Arc::new(LogEvents),
        }
    }

    fn admin_address(&self, name: &str) -> String {
        let host = client_service_dns_name(
            name,
            &self.namespace,
            self.config.operator.cluster_domain.as_deref(),
        );
        format!("{host}:{DATABASE_PORT}")
    }
}

#[async_trait]
impl DeploymentSource for KubeSource {
    async fn list(&self) -> anyhow::Result<Vec<String>> {
        match &self.deployments {
            Deployments::Resources(store) => Ok(store.list_names().await?),
            Deployments::Local(store) => Ok(store.list_deployments()?),
        }
    }

    fn store(&self) -> Arc<dyn StatusStore> {
        match &self.deployments {
            Deployments::Resources(store) => Arc::new(store.clone()),
            Deployments::Local(store) => Arc::new(store.clone()),
        }
    }

    fn build_loop(&self, name: &str) -> anyhow::Result<DeploymentLoop> {
        let store = self.store();
        let events = self.events();
        let pods = Arc::new(KubePods::new(self.client.clone(), &self.namespace, name));

        let mut render = RenderContext::new(name, &self.namespace).with_features(self.features);
        render.cluster_domain = self.config.operator.cluster_domain.clone();

        let ctx = DeploymentContext::new(render, store.clone(), pods, events.clone())
            .with_timeouts(self.timeouts);

        let scaling = self.config.scaling.enabled.then(|| {
            let mut admin = HttpClusterAdmin::new(self.admin_address(name), self.timeouts.database());
            if let Some(jwt) = &self.config.scaling.jwt {
                admin = admin.with_token(jwt.clone());
            }
            Arc::new(
                ScalingIntegration::new(name, store, Arc::new(admin), events)
                    .with_timeouts(&self.timeouts),
            )
        });

        Ok(DeploymentLoop::new(ctx, scaling, self.config.reconcile_interval()))
    }
}
