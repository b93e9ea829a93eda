//! Cluster scaling integration.
//!
//! Keeps the coordinator and DB server counts the database UI shows in
//! sync with the deployment spec, in both directions:
//!
//! ```text
//!  spec change ──send_update_to_cluster──▶ pending ──push──▶ cluster
//!  cluster UI  ──────────inspect───────────────────────────▶ spec (CAS)
//! ```
//!
//! All mutable state lives in one [`ScalingState`] behind a mutex that is
//! only held for field access. A separate toggle lock serializes a whole
//! tick against [`ScalingIntegration::disable`] and
//! [`ScalingIntegration::enable`], so a push from a tick can never land
//! after scaling was turned off. Only deployments in cluster mode are
//! synced.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tessera_core::{Timeout, Timeouts};
use tessera_state::{
    DeploymentEvent, DeploymentMode, DeploymentPhase, DeploymentSpec, EventRecorder, ServerGroup,
    StatusStore, TimedStore, with_spec_update,
};

use crate::admin::{ClusterAdmin, NumberOfServers};
use crate::error::{ScalingError, ScalingResult};

/// Period of the integration loop.
pub const TICK: Duration = Duration::from_secs(2);

/// Time a fresh cluster gets to bootstrap before failures are loud.
pub const BOOTSTRAP_GRACE: Duration = Duration::from_secs(120);

/// Event reason recorded when counts from the cluster are rejected.
pub const REASON_VALIDATION_FAILED: &str = "ValidationFailed";

#[derive(Debug, Clone)]
struct PendingUpdate {
    generation: u64,
    spec: DeploymentSpec,
}

#[derive(Debug)]
struct ScalingState {
    pending: Option<PendingUpdate>,
    next_generation: u64,
    /// Counts last pushed to or observed from the cluster.
    last: NumberOfServers,
    enabled: bool,
}

/// Counts derived from a spec.
fn spec_counts(spec: &DeploymentSpec) -> NumberOfServers {
    NumberOfServers::new(
        Some(spec.desired_count(ServerGroup::Coordinators)),
        Some(spec.desired_count(ServerGroup::DBServers)),
    )
}

/// Counts as pushed: a group whose bounds pin the count is not scalable
/// from the UI and is sent as `None`.
fn pushable(spec: &DeploymentSpec, counts: NumberOfServers) -> NumberOfServers {
    let fixed = |g: ServerGroup| {
        let group = spec.group(g);
        group.min() == group.max()
    };
    NumberOfServers::new(
        counts.coordinators.filter(|_| !fixed(ServerGroup::Coordinators)),
        counts.dbservers.filter(|_| !fixed(ServerGroup::DBServers)),
    )
}

fn changed(live: Option<u32>, last: Option<u32>) -> bool {
    matches!((live, last), (Some(a), Some(b)) if a != b)
}

pub struct ScalingIntegration {
    deployment: String,
    store: Arc<dyn StatusStore>,
    store_timeout: Timeout,
    admin: Arc<dyn ClusterAdmin>,
    events: Arc<dyn EventRecorder>,
    state: Mutex<ScalingState>,
    /// Held across admin calls by ticks, `disable` and `enable`.
    toggle: Mutex<()>,
}

impl ScalingIntegration {
    pub fn new(
        deployment: impl Into<String>,
        store: Arc<dyn StatusStore>,
        admin: Arc<dyn ClusterAdmin>,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            deployment: deployment.into(),
            store,
            store_timeout: Timeouts::default().kubernetes(),
            admin,
            events,
            state: Mutex::new(ScalingState {
                pending: None,
                next_generation: 0,
                last: NumberOfServers::default(),
                enabled: true,
            }),
            toggle: Mutex::new(()),
        }
    }

    /// Bound status store calls by the Kubernetes deadline of `timeouts`.
    pub fn with_timeouts(mut self, timeouts: &Timeouts) -> Self {
        self.store_timeout = timeouts.kubernetes();
        self
    }

    fn store(&self) -> TimedStore {
        TimedStore::new(self.store.clone(), self.store_timeout)
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.enabled
    }

    pub async fn last_number_of_servers(&self) -> NumberOfServers {
        self.state.lock().await.last
    }

    pub async fn has_pending_update(&self) -> bool {
        self.state.lock().await.pending.is_some()
    }

    /// Queue `spec` to be pushed on the next tick, replacing any queued spec.
    pub async fn send_update_to_cluster(&self, spec: DeploymentSpec) {
        let mut state = self.state.lock().await;
        state.next_generation += 1;
        state.pending = Some(PendingUpdate {
            generation: state.next_generation,
            spec,
        });
    }

    /// Stop the UI from scaling: push `None` counts, then disable.
    pub async fn disable(&self) -> ScalingResult<()> {
        let _toggle = self.toggle.lock().await;
        self.admin.set_number_of_servers(None, None).await?;
        self.state.lock().await.enabled = false;
        info!(deployment = %self.deployment, "cluster scaling disabled");
        Ok(())
    }

    /// Push the desired counts and enable again.
    pub async fn enable(&self) -> ScalingResult<()> {
        let _toggle = self.toggle.lock().await;
        if self.is_enabled().await {
            return Ok(());
        }
        let current = self.store().read(&self.deployment).await?;
        self.push_desired(&current.spec).await?;
        self.state.lock().await.enabled = true;
        info!(deployment = %self.deployment, "cluster scaling enabled");
        Ok(())
    }

    async fn push_desired(&self, spec: &DeploymentSpec) -> ScalingResult<()> {
        let counts = spec_counts(spec);
        self.admin
            .set_number_of_servers(counts.coordinators, counts.dbservers)
            .await?;
        Ok(())
    }

    fn report(&self, expect_success: bool, what: &str, err: &ScalingError) {
        if expect_success {
            warn!(deployment = %self.deployment, error = %err, "{what}");
        } else {
            debug!(deployment = %self.deployment, error = %err, "{what}");
        }
    }

    /// One tick. Returns whether the cluster was inspected successfully.
    pub async fn check_scaling_cluster(&self, expect_success: bool) -> bool {
        let _toggle = self.toggle.lock().await;
        let current = match self.store().read(&self.deployment).await {
            Ok(current) => current,
            Err(e) => {
                self.report(expect_success, "failed to read deployment", &e.into());
                return false;
            }
        };

        if current.spec.mode != DeploymentMode::Cluster {
            return false;
        }

        if !self.is_enabled().await
            && current.status.plan.is_empty()
            && self.push_desired(&current.spec).await.is_ok()
        {
            // The enabling action may have failed; with an empty plan
            // nothing else will turn scaling back on.
            self.state.lock().await.enabled = true;
        }

        if current.status.phase != DeploymentPhase::Running || !self.is_enabled().await {
            return false;
        }

        match self.update_cluster_server_count().await {
            Err(e) => {
                self.report(expect_success, "cluster update failed", &e);
                false
            }
            Ok(false) => false,
            Ok(true) => match self.inspect_cluster().await {
                Ok(()) => true,
                Err(e) => {
                    self.report(expect_success, "cluster inspection failed", &e);
                    false
                }
            },
        }
    }

    /// Push a pending spec. Returns true when it is safe to read counts
    /// back, i.e. no newer spec was queued meanwhile.
    async fn update_cluster_server_count(&self) -> ScalingResult<bool> {
        let (pending, last) = {
            let state = self.state.lock().await;
            (state.pending.clone(), state.last)
        };
        let Some(pending) = pending else {
            return Ok(true);
        };

        let counts = spec_counts(&pending.spec);
        if counts != last {
            let pushed = pushable(&pending.spec, counts);
            self.admin
                .set_number_of_servers(pushed.coordinators, pushed.dbservers)
                .await?;
            debug!(
                deployment = %self.deployment,
                coordinators = ?pushed.coordinators,
                dbservers = ?pushed.dbservers,
                "pushed server counts"
            );
        }

        let mut state = self.state.lock().await;
        let safe = state
            .pending
            .as_ref()
            .is_some_and(|p| p.generation == pending.generation);
        if safe {
            state.pending = None;
        }
        state.last = counts;
        Ok(safe)
    }

    /// Read counts from the cluster and write UI changes back to the spec.
    async fn inspect_cluster(&self) -> ScalingResult<()> {
        let live = self.admin.get_number_of_servers().await?;
        if live.coordinators.is_none() && live.dbservers.is_none() {
            return Ok(());
        }

        let last = self.state.lock().await.last;
        let coordinators_changed = changed(live.coordinators, last.coordinators);
        let dbservers_changed = changed(live.dbservers, last.dbservers);

        if !coordinators_changed && !dbservers_changed {
            // First look after an operator restart: adopt what the cluster has.
            let mut state = self.state.lock().await;
            if state.last.coordinators.is_none() || state.last.dbservers.is_none() {
                if live.coordinators.is_some() {
                    state.last.coordinators = live.coordinators;
                }
                if live.dbservers.is_some() {
                    state.last.dbservers = live.dbservers;
                }
            }
            return Ok(());
        }

        let current = self.store().read(&self.deployment).await?;
        let apply = |spec: &mut DeploymentSpec| {
            if coordinators_changed {
                spec.coordinators.count = live.coordinators;
            }
            if dbservers_changed {
                spec.dbservers.count = live.dbservers;
            }
        };
        let mut candidate = current.spec.clone();
        apply(&mut candidate);

        let outcome = match candidate.validate() {
            Err(e) => {
                warn!(deployment = %self.deployment, error = %e, "validation of updated spec failed");
                self.events
                    .record(DeploymentEvent::warning(
                        &self.deployment,
                        REASON_VALIDATION_FAILED,
                        e.to_string(),
                    ))
                    .await;
                self.send_update_to_cluster(current.spec).await;
                Ok(())
            }
            Ok(()) => {
                with_spec_update(&self.store(), &self.deployment, |spec| {
                    apply(spec);
                    true
                })
                .await?;
                info!(
                    deployment = %self.deployment,
                    coordinators = ?live.coordinators,
                    dbservers = ?live.dbservers,
                    "adopted server counts from cluster"
                );
                self.state.lock().await.pending = None;
                Ok(())
            }
        };

        let mut state = self.state.lock().await;
        if coordinators_changed {
            state.last.coordinators = live.coordinators;
        }
        if dbservers_changed {
            state.last.dbservers = live.dbservers;
        }
        outcome
    }

    /// Run ticks until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let start = Instant::now();
        let mut good_inspections: u64 = 0;
        debug!(deployment = %self.deployment, "scaling integration starting");

        loop {
            let expect_success = good_inspections > 0 || start.elapsed() > BOOTSTRAP_GRACE;
            if self.check_scaling_cluster(expect_success).await {
                good_inspections += 1;
            }

            tokio::select! {
                _ = tokio::time::sleep(TICK) => {}
                _ = shutdown.changed() => {
                    debug!(deployment = %self.deployment, "scaling integration shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_state::ServerGroupSpec;

    fn spec(min: u32, max: u32) -> DeploymentSpec {
        DeploymentSpec {
            image: "db:1".to_string(),
            coordinators: ServerGroupSpec::with_count(3).with_bounds(min, max),
            ..Default::default()
        }
    }

    #[test]
    fn pinned_group_is_pushed_as_none() {
        let s = spec(3, 3);
        let pushed = pushable(&s, spec_counts(&s));
        assert_eq!(pushed, NumberOfServers::new(None, Some(3)));

        let s = spec(2, 5);
        let pushed = pushable(&s, spec_counts(&s));
        assert_eq!(pushed, NumberOfServers::new(Some(3), Some(3)));
    }

    #[test]
    fn change_needs_both_sides_known() {
        assert!(changed(Some(4), Some(3)));
        assert!(!changed(Some(4), None));
        assert!(!changed(None, Some(3)));
        assert!(!changed(Some(3), Some(3)));
    }
}
