//! Deployment events published as Kubernetes events.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

use tessera_state::{DeploymentEvent, EventKind, EventRecorder, LogEvents};

use crate::crd::DatabaseDeployment;

pub const CONTROLLER_NAME: &str = "tessera-operator";

/// Records events against the `DatabaseDeployment` they concern.
///
/// Every event is also logged. Publishing failures are logged and
/// otherwise ignored.
pub struct KubeEvents {
    client: Client,
    namespace: String,
    reporter: Reporter,
}

impl KubeEvents {
    pub fn new(client: Client, namespace: &str, instance: Option<String>) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance,
            },
        }
    }

    fn reference(&self, deployment: &str) -> ObjectReference {
        deployment_reference(&self.namespace, deployment)
    }
}

fn deployment_reference(namespace: &str, deployment: &str) -> ObjectReference {
    ObjectReference {
        api_version: Some(DatabaseDeployment::api_version(&()).to_string()),
        kind: Some(DatabaseDeployment::kind(&()).to_string()),
        name: Some(deployment.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

fn event_type(kind: EventKind) -> EventType {
    match kind {
        EventKind::Normal => EventType::Normal,
        EventKind::Warning => EventType::Warning,
    }
}

#[async_trait]
impl EventRecorder for KubeEvents {
    async fn record(&self, event: DeploymentEvent) {
        LogEvents.record(event.clone()).await;

        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            self.reference(&event.deployment),
        );
        let published = recorder
            .publish(Event {
                type_: event_type(event.kind),
                reason: event.reason.clone(),
                note: Some(event.message),
                action: "Reconcile".to_string(),
                secondary: None,
            })
            .await;
        if let Err(e) = published {
            warn!(deployment = %event.deployment, reason = %event.reason, error = %e, "failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_points_at_the_custom_resource() {
        let r = deployment_reference("prod", "db");
        assert_eq!(r.api_version.as_deref(), Some("tessera.io/v1"));
        assert_eq!(r.kind.as_deref(), Some("DatabaseDeployment"));
        assert_eq!(r.name.as_deref(), Some("db"));
        assert_eq!(r.namespace.as_deref(), Some("prod"));
    }

    #[test]
    fn kinds_map_to_event_types() {
        assert!(matches!(event_type(EventKind::Warning), EventType::Warning));
        assert!(matches!(event_type(EventKind::Normal), EventType::Normal));
    }
}
