//! Operator discovery and the admin API over in-memory deployments.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use tessera_pod::RenderContext;
use tessera_reconcile::DeploymentContext;
use tessera_reconcile::testing::{MemoryPods, small_cluster_spec};
use tessera_state::{MemoryEvents, StateStore, StatusStore};
use tesserad::{DeploymentLoop, DeploymentSource, Operator, build_router};

/// Deployments stored in redb, pods held in memory.
struct MemorySource {
    store: StateStore,
    pods: Mutex<HashMap<String, Arc<MemoryPods>>>,
}

impl MemorySource {
    fn new() -> Self {
        Self {
            store: StateStore::open_in_memory().unwrap(),
            pods: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DeploymentSource for MemorySource {
    async fn list(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.store.list_deployments()?)
    }

    fn store(&self) -> Arc<dyn StatusStore> {
        Arc::new(self.store.clone())
    }

    fn build_loop(&self, name: &str) -> anyhow::Result<DeploymentLoop> {
        let pods = self
            .pods
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryPods::new()))
            .clone();
        let ctx = DeploymentContext::new(
            RenderContext::new(name, "default"),
            self.store(),
            pods,
            Arc::new(MemoryEvents::new()),
        );
        Ok(DeploymentLoop::new(ctx, None, Duration::from_secs(5)))
    }
}

fn setup() -> (Arc<MemorySource>, Arc<Operator>) {
    let source = Arc::new(MemorySource::new());
    let operator = Arc::new(Operator::new(source.clone()));
    (source, operator)
}

async fn get_json(operator: &Arc<Operator>, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = build_router(operator.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_for_members(store: &StateStore, name: &str, count: usize) {
    for _ in 0..100 {
        let v = store.read(name).await.unwrap();
        if v.status.members.iter().count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{name} never reached {count} members");
}

#[tokio::test]
async fn sync_starts_and_stops_loops() {
    let (source, operator) = setup();
    source.store.put_deployment("alpha", &small_cluster_spec()).unwrap();
    source.store.put_deployment("beta", &small_cluster_spec()).unwrap();

    assert_eq!(operator.sync().await.unwrap(), (2, 0));
    assert_eq!(operator.active_deployments().await, vec!["alpha", "beta"]);
    assert_eq!(operator.sync().await.unwrap(), (0, 0));

    source.store.delete_deployment("beta").unwrap();
    assert_eq!(operator.sync().await.unwrap(), (0, 1));
    assert!(operator.is_running("alpha").await);
    assert!(!operator.is_running("beta").await);

    operator.stop_all().await;
    assert!(operator.active_deployments().await.is_empty());
}

#[tokio::test]
async fn started_loop_reconciles_deployment() {
    let (source, operator) = setup();
    source.store.put_deployment("alpha", &small_cluster_spec()).unwrap();
    operator.start_loop("alpha").await.unwrap();

    wait_for_members(&source.store, "alpha", 3).await;
    operator.stop_loop("alpha").await;
    assert!(!operator.is_running("alpha").await);
}

#[tokio::test]
async fn healthz_counts_loops() {
    let (source, operator) = setup();
    source.store.put_deployment("alpha", &small_cluster_spec()).unwrap();
    operator.sync().await.unwrap();

    let (status, body) = get_json(&operator, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["deployments"], 1);
    operator.stop_all().await;
}

#[tokio::test]
async fn deployments_are_listed_and_fetched() {
    let (source, operator) = setup();
    source.store.put_deployment("alpha", &small_cluster_spec()).unwrap();
    operator.sync().await.unwrap();
    wait_for_members(&source.store, "alpha", 3).await;

    let (status, body) = get_json(&operator, "/api/v1/deployments").await;
    assert_eq!(status, StatusCode::OK);
    let list = body["data"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "alpha");
    assert_eq!(list[0]["members"], 3);

    let (status, body) = get_json(&operator, "/api/v1/deployments/alpha").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "alpha");
    assert_eq!(body["data"]["spec"]["image"], "arangodb/arangodb:3.11");

    let (status, body) = get_json(&operator, "/api/v1/deployments/alpha/plan").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_array());
    operator.stop_all().await;
}

#[tokio::test]
async fn unknown_deployment_is_not_found() {
    let (_source, operator) = setup();

    let (status, body) = get_json(&operator, "/api/v1/deployments/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = get_json(&operator, "/api/v1/deployments/ghost/plan").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
