//! Operator — one background control loop per deployment.
//!
//! The operator periodically lists the deployments known to its
//! [`DeploymentSource`], starts a [`DeploymentLoop`] for each new one and
//! stops loops whose deployment disappeared.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tessera_state::StatusStore;

use crate::deployment::DeploymentLoop;

/// Where deployments come from and how their loops are wired.
#[async_trait]
pub trait DeploymentSource: Send + Sync {
    /// Names of the deployments that should be reconciled.
    async fn list(&self) -> anyhow::Result<Vec<String>>;

    fn store(&self) -> Arc<dyn StatusStore>;

    fn build_loop(&self, name: &str) -> anyhow::Result<DeploymentLoop>;
}

struct LoopSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct Operator {
    source: Arc<dyn DeploymentSource>,
    /// Active loops: deployment name → slot.
    loops: Arc<RwLock<HashMap<String, LoopSlot>>>,
}

impl Operator {
    pub fn new(source: Arc<dyn DeploymentSource>) -> Self {
        Self {
            source,
            loops: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> Arc<dyn StatusStore> {
        self.source.store()
    }

    /// Start the loop of `name`, replacing a running one.
    pub async fn start_loop(&self, name: &str) -> anyhow::Result<()> {
        let deployment = self.source.build_loop(name)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(deployment.run(shutdown_rx));

        let mut loops = self.loops.write().await;
        if let Some(old) = loops.insert(name.to_string(), LoopSlot { handle, shutdown_tx }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }
        info!(deployment = %name, "deployment loop scheduled");
        Ok(())
    }

    pub async fn stop_loop(&self, name: &str) {
        let mut loops = self.loops.write().await;
        if let Some(slot) = loops.remove(name) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(deployment = %name, "deployment loop stopped");
        }
    }

    pub async fn stop_all(&self) {
        let mut loops = self.loops.write().await;
        for (name, slot) in loops.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(deployment = %name, "deployment loop stopped");
        }
        info!("all deployment loops stopped");
    }

    /// Names of deployments with a running loop, sorted.
    pub async fn active_deployments(&self) -> Vec<String> {
        let loops = self.loops.read().await;
        let mut names: Vec<String> = loops.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.loops.read().await.contains_key(name)
    }

    /// Align running loops with the source. Returns (started, stopped).
    pub async fn sync(&self) -> anyhow::Result<(usize, usize)> {
        let wanted = self.source.list().await?;
        let running = self.active_deployments().await;

        let mut stopped = 0;
        for name in running.iter().filter(|n| !wanted.contains(*n)) {
            self.stop_loop(name).await;
            stopped += 1;
        }

        let mut started = 0;
        for name in wanted.iter().filter(|n| !running.contains(*n)) {
            match self.start_loop(name).await {
                Ok(()) => started += 1,
                Err(e) => warn!(deployment = %name, error = %e, "cannot start deployment loop"),
            }
        }
        Ok((started, stopped))
    }

    /// Discover deployments every `interval` until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "operator started");
        loop {
            match self.sync().await {
                Ok((0, 0)) => {}
                Ok((started, stopped)) => info!(started, stopped, "deployment loops updated"),
                Err(e) => warn!(error = %e, "deployment discovery failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        self.stop_all().await;
    }
}
