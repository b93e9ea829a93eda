//! Plan executor.
//!
//! ```text
//!            start()=true
//! Pending ───────────────────────────────► Ready (head removed, next action)
//!    │ start()=false
//!    ▼
//! Started ── check_progress().ready ─────► Ready
//!    │  ├── check_progress().abort ──────► Aborted (plan cleared)
//!    │  └── past timeout ────────────────► Failed (plan cleared, ActionFailed)
//!    └── otherwise: stay, poll next pass
//! ```
//!
//! At most one action is in flight. Every transition is a compare-and-swap
//! on the status, so the executor resumes from the persisted head after a
//! restart.

use std::time::Duration;

use tracing::{debug, info, warn};

use tessera_state::{Action as PlannedAction, ConditionType, DeploymentEvent, epoch_secs};

use crate::action::Action;
use crate::context::DeploymentContext;
use crate::error::ReconcileResult;
use crate::registry::create_action;

/// Event and condition reason of an action that ran past its timeout.
pub const REASON_ACTION_TIMEOUT: &str = "ActionTimeout";

/// Run the plan as far as it goes in one pass.
///
/// Returns true while actions remain, so the caller can requeue early.
pub async fn execute_plan(ctx: &DeploymentContext) -> ReconcileResult<bool> {
    loop {
        let current = ctx.read().await?;
        let Some(head) = current.status.plan.first().cloned() else {
            return Ok(false);
        };

        let Some(handler) = create_action(head.clone()) else {
            warn!(deployment = %ctx.name(), action = %head.type_, "no handler for action, dropping it");
            remove_head(ctx, &head.id).await?;
            continue;
        };

        if !head.is_started() {
            match handler.start(ctx).await {
                Ok(true) => {
                    debug!(deployment = %ctx.name(), action = %head.type_, member = %head.member_id, "action done");
                    remove_head(ctx, &head.id).await?;
                    continue;
                }
                Ok(false) => {
                    info!(deployment = %ctx.name(), action = %head.type_, member = %head.member_id, "action started");
                    mark_started(ctx, &head.id).await?;
                }
                Err(e) => {
                    warn!(deployment = %ctx.name(), action = %head.type_, member = %head.member_id, error = %e, "action failed to start");
                }
            }
            return Ok(true);
        }

        match handler.check_progress(ctx).await {
            Ok(progress) if progress.ready => {
                debug!(deployment = %ctx.name(), action = %head.type_, member = %head.member_id, "action ready");
                remove_head(ctx, &head.id).await?;
                continue;
            }
            Ok(progress) if progress.abort => {
                warn!(deployment = %ctx.name(), action = %head.type_, member = %head.member_id, "action aborted, dropping plan");
                ctx.with_status_update(|status| {
                    let had_plan = !status.plan.is_empty();
                    status.plan.clear();
                    had_plan
                })
                .await?;
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(deployment = %ctx.name(), action = %head.type_, member = %head.member_id, error = %e, "progress check failed");
            }
        }

        if is_timed_out(handler.as_ref(), &head, epoch_secs()) {
            fail_timed_out(ctx, &head, handler.timeout()).await?;
            return Ok(false);
        }
        return Ok(true);
    }
}

fn is_timed_out(handler: &dyn Action, head: &PlannedAction, now: u64) -> bool {
    let timeout = handler.timeout();
    if timeout.is_zero() {
        return false;
    }
    head.start_time
        .is_some_and(|started| now.saturating_sub(started) > timeout.as_secs())
}

async fn remove_head(ctx: &DeploymentContext, id: &str) -> ReconcileResult<()> {
    ctx.with_status_update(|status| status.plan.remove_head(id).is_some())
        .await?;
    Ok(())
}

async fn mark_started(ctx: &DeploymentContext, id: &str) -> ReconcileResult<()> {
    let now = epoch_secs();
    ctx.with_status_update(|status| match status.plan.first_mut() {
        Some(head) if head.id == id && head.start_time.is_none() => {
            head.start_time = Some(now);
            true
        }
        _ => false,
    })
    .await?;
    Ok(())
}

/// Drop the whole plan and flag the member the action was working on.
async fn fail_timed_out(
    ctx: &DeploymentContext,
    head: &PlannedAction,
    timeout: Duration,
) -> ReconcileResult<()> {
    let message = format!("{} timed out after {}s", head.type_, timeout.as_secs());
    warn!(deployment = %ctx.name(), action = %head.type_, member = %head.member_id, "{message}");

    ctx.with_status_update(|status| {
        if status.plan.first().is_none_or(|a| a.id != head.id) {
            return false;
        }
        status.plan.clear();
        if let Some(m) = status.members.find_mut(&head.member_id) {
            m.conditions
                .update(ConditionType::ActionFailed, true, REASON_ACTION_TIMEOUT, &message);
        }
        true
    })
    .await?;

    ctx.record(DeploymentEvent::warning(ctx.name(), REASON_ACTION_TIMEOUT, message))
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_state::{ActionType, ServerGroup};

    #[test]
    fn timeout_boundaries() {
        let handler =
            create_action(PlannedAction::new(ActionType::WaitForMemberUp, ServerGroup::Agents, "AGNT-1"))
                .unwrap();
        let mut head = handler.planned().clone();
        assert!(!is_timed_out(handler.as_ref(), &head, 10_000));

        head.start_time = Some(1_000);
        assert!(!is_timed_out(handler.as_ref(), &head, 1_000 + 600));
        assert!(is_timed_out(handler.as_ref(), &head, 1_000 + 601));
    }
}
