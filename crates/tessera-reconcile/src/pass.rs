//! One reconciliation pass of a deployment.
//!
//! ```text
//! refresh snapshot → validate spec → inspect resources
//!                  → build plan (only when none is persisted) → execute
//! ```

use tracing::{debug, warn};

use tessera_pod::names::validate_resource_name;
use tessera_state::DeploymentEvent;

use crate::builder::{PlanContext, build_plan};
use crate::context::DeploymentContext;
use crate::error::ReconcileResult;
use crate::executor::execute_plan;
use crate::resources::inspect_resources;

/// Event reason of a rejected spec.
pub const REASON_SPEC_INVALID: &str = "SpecInvalid";

/// Outcome of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// The spec was rejected and nothing was done.
    pub rejected: bool,
    /// Actions remain in the plan.
    pub plan_pending: bool,
}

pub async fn reconcile_once(ctx: &DeploymentContext) -> ReconcileResult<PassOutcome> {
    ctx.refresh_snapshot().await?;
    let current = ctx.read().await?;

    let valid = validate_resource_name(ctx.name())
        .map_err(|e| e.to_string())
        .and_then(|()| current.spec.validate().map_err(|e| e.to_string()));
    if let Err(reason) = valid {
        warn!(deployment = %ctx.name(), %reason, "spec rejected");
        ctx.record(DeploymentEvent::warning(ctx.name(), REASON_SPEC_INVALID, reason))
            .await;
        return Ok(PassOutcome {
            rejected: true,
            plan_pending: !current.status.plan.is_empty(),
        });
    }

    let checksum = current.spec.checksum()?;
    ctx.with_status_update(|status| {
        if status.accepted_spec_checksum.as_deref() == Some(checksum.as_str()) {
            return false;
        }
        status.accepted_spec_checksum = Some(checksum.clone());
        true
    })
    .await?;

    let inspection = inspect_resources(ctx, &current).await?;
    if inspection.touched_cluster() {
        ctx.refresh_snapshot().await?;
    }

    let current = ctx.read().await?;
    if current.status.plan.is_empty() {
        let encryption_keys = match current.spec.encryption_key_secret.as_deref() {
            Some(secret) => Some(
                ctx.encryption_key_hashes(secret)
                    .await
                    .map_err(|e| e.to_string()),
            ),
            None => None,
        };
        let snapshot = ctx.cached_snapshot().await;
        let plan = build_plan(&PlanContext {
            deployment: ctx.name(),
            spec: &current.spec,
            status: &current.status,
            snapshot: &snapshot,
            render: ctx.render(),
            encryption_keys,
        });
        if !plan.is_empty() {
            let stored = ctx
                .with_status_update(|status| {
                    if !status.plan.is_empty() {
                        return false;
                    }
                    status.plan = plan.clone();
                    true
                })
                .await?;
            debug!(deployment = %ctx.name(), actions = plan.len(), stored, "plan persisted");
        }
    }

    Ok(PassOutcome {
        rejected: false,
        plan_pending: execute_plan(ctx).await?,
    })
}
