//! Control loop of one deployment.
//!
//! ```text
//! ┌─────────── DeploymentLoop ───────────┐
//! │ reconcile task     scaling task      │
//! │ reconcile_once     check_scaling_    │
//! │  under deadline      cluster every   │
//! │ requeue interval     tick            │
//! └──────────── shared status store ─────┘
//! ```
//!
//! While a plan is in flight the loop ticks fast; an idle deployment backs
//! off up to the configured interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tessera_core::Interval;
use tessera_reconcile::{DeploymentContext, PassOutcome, reconcile_once};
use tessera_scaling::ScalingIntegration;

/// Requeue interval while actions remain in the plan.
pub const PLAN_TICK: Duration = Duration::from_secs(2);

const BACKOFF_FACTOR: f64 = 1.5;

pub struct DeploymentLoop {
    ctx: Arc<DeploymentContext>,
    scaling: Option<Arc<ScalingIntegration>>,
    max_interval: Duration,
    /// Spec checksum last handed to the scaling integration.
    propagated: Option<String>,
}

impl DeploymentLoop {
    pub fn new(
        ctx: DeploymentContext,
        scaling: Option<Arc<ScalingIntegration>>,
        max_interval: Duration,
    ) -> Self {
        let ctx = match &scaling {
            Some(s) => ctx.with_scaling(s.clone()),
            None => ctx,
        };
        Self {
            ctx: Arc::new(ctx),
            scaling,
            max_interval: max_interval.max(PLAN_TICK),
            propagated: None,
        }
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn context(&self) -> &Arc<DeploymentContext> {
        &self.ctx
    }

    /// One pass under the reconciliation deadline; returns the next interval.
    pub async fn tick(&mut self, interval: Interval) -> Interval {
        let deadline = self.ctx.timeouts().reconciliation();
        match deadline.run(reconcile_once(&self.ctx)).await {
            Ok(Ok(outcome)) => {
                if !outcome.rejected {
                    self.propagate_spec().await;
                }
                self.next_interval(interval, outcome)
            }
            Ok(Err(e)) => {
                warn!(deployment = %self.name(), error = %e, "reconciliation failed");
                interval.backoff(BACKOFF_FACTOR, self.max_interval)
            }
            Err(e) => {
                warn!(deployment = %self.name(), error = %e, "reconciliation timed out");
                interval.backoff(BACKOFF_FACTOR, self.max_interval)
            }
        }
    }

    fn next_interval(&self, interval: Interval, outcome: PassOutcome) -> Interval {
        if outcome.plan_pending {
            Interval::new(PLAN_TICK)
        } else {
            interval
                .backoff(BACKOFF_FACTOR, self.max_interval)
                .increase_to(PLAN_TICK)
        }
    }

    /// Hand an accepted spec change to the scaling integration.
    async fn propagate_spec(&mut self) {
        let Some(scaling) = &self.scaling else {
            return;
        };
        let current = match self.ctx.read().await {
            Ok(current) => current,
            Err(e) => {
                debug!(deployment = %self.name(), error = %e, "cannot read spec for scaling");
                return;
            }
        };
        let accepted = current.status.accepted_spec_checksum.clone();
        if accepted.is_some() && accepted != self.propagated {
            scaling.send_update_to_cluster(current.spec).await;
            self.propagated = accepted;
        }
    }

    /// Run until `shutdown` flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(deployment = %self.name(), "deployment loop started");

        let scaling_task = self.scaling.clone().map(|scaling| {
            let rx = shutdown.clone();
            tokio::spawn(async move { scaling.run(rx).await })
        });

        let mut interval = Interval::new(PLAN_TICK);
        loop {
            interval = self.tick(interval).await;

            tokio::select! {
                _ = tokio::time::sleep(interval.duration()) => {}
                _ = shutdown.changed() => break,
            }
        }

        if let Some(task) = scaling_task {
            let _ = task.await;
        }
        info!(deployment = %self.name(), "deployment loop stopped");
    }
}
