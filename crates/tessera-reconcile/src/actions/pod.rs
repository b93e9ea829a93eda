//! Actions on member pods.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use tessera_core::Feature;
use tessera_pod::constants::{
    FINALIZER_DELAY_POD_TERMINATION, FINALIZER_GRACEFUL_SHUTDOWN, SERVER_CONTAINER_NAME,
};
use tessera_state::{Action as PlannedAction, ConditionType, MemberPhase};

use crate::action::{Action, Progress};
use crate::actions::PARAM_IMAGE;
use crate::context::{DeploymentContext, has_finalizer, is_pod_ready};
use crate::error::{ActionError, ActionResult, ResourceError};

fn ignore_not_found(result: Result<(), ResourceError>) -> Result<(), ResourceError> {
    match result {
        Err(ResourceError::NotFound(_)) => Ok(()),
        other => other,
    }
}

/// Keeps resource inspection from recreating the pod while it goes away.
async fn mark_terminating(
    ctx: &DeploymentContext,
    id: &str,
    reason: &str,
    message: &str,
) -> ActionResult<()> {
    ctx.with_status_update(|status| {
        status.members.find_mut(id).is_some_and(|m| {
            m.conditions
                .update(ConditionType::Terminating, true, reason, message)
        })
    })
    .await?;
    Ok(())
}

// ── KillMemberPod ──────────────────────────────────────────────────

planned_action!(KillMemberPod);

#[async_trait]
impl Action for KillMemberPod {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        if !ctx.features().enabled(Feature::GracefulShutdown) {
            return Ok(true);
        }
        let Some((_, member)) = ctx.member_status_by_id(&self.action.member_id).await? else {
            error!(deployment = %ctx.name(), member = %self.action.member_id, "no such member");
            return Ok(true);
        };
        let Some(pod) = member.pod_name else {
            return Ok(true);
        };
        if let Err(e) = ignore_not_found(ctx.delete_pod(&pod).await) {
            error!(deployment = %ctx.name(), %pod, error = %e, "unable to kill pod");
            return Ok(true);
        }
        mark_terminating(ctx, &self.action.member_id, "Killed", "Pod is shutting down").await?;
        Ok(false)
    }

    async fn check_progress(&self, ctx: &DeploymentContext) -> ActionResult<Progress> {
        if !ctx.features().enabled(Feature::GracefulShutdown) {
            return Ok(Progress::ready());
        }
        let Some((_, member)) = ctx.member_status_by_id(&self.action.member_id).await? else {
            return Ok(Progress::ready());
        };
        let snapshot = ctx.cached_snapshot().await;
        let Some(pod) = snapshot.member_pod(&member) else {
            return Ok(Progress::ready());
        };
        if has_finalizer(pod, FINALIZER_GRACEFUL_SHUTDOWN)
            && has_finalizer(pod, FINALIZER_DELAY_POD_TERMINATION)
        {
            return Ok(Progress::pending());
        }
        Ok(Progress::ready())
    }
}

// ── RotateMember ───────────────────────────────────────────────────

planned_action!(RotateMember);

#[async_trait]
impl Action for RotateMember {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15 * 60)
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        let id = &self.action.member_id;
        let Some((_, member)) = ctx.member_status_by_id(id).await? else {
            return Ok(true);
        };
        let Some(pod) = member.pod_name else {
            return Ok(true);
        };
        ignore_not_found(ctx.delete_pod(&pod).await)?;
        mark_terminating(ctx, id, "Rotating", "Pod is being rotated").await?;
        info!(deployment = %ctx.name(), member = %id, %pod, "rotating member");
        Ok(false)
    }

    async fn check_progress(&self, ctx: &DeploymentContext) -> ActionResult<Progress> {
        let id = &self.action.member_id;
        let Some((_, member)) = ctx.member_status_by_id(id).await? else {
            return Ok(Progress::ready());
        };
        if ctx.cached_snapshot().await.member_pod(&member).is_some() {
            debug!(deployment = %ctx.name(), member = %id, "waiting for pod to terminate");
            return Ok(Progress::pending());
        }
        ctx.with_status_update(|status| match status.members.find_mut(id) {
            Some(m) if m.pod_name.is_some() || m.phase != MemberPhase::Pending => {
                m.clear_pod();
                true
            }
            _ => false,
        })
        .await?;
        Ok(Progress::ready())
    }
}

// ── WaitForMemberUp ────────────────────────────────────────────────

planned_action!(WaitForMemberUp);

#[async_trait]
impl Action for WaitForMemberUp {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, _ctx: &DeploymentContext) -> ActionResult<bool> {
        Ok(false)
    }

    async fn check_progress(&self, ctx: &DeploymentContext) -> ActionResult<Progress> {
        let Some((_, member)) = ctx.member_status_by_id(&self.action.member_id).await? else {
            return Ok(Progress::ready());
        };
        if member.phase != MemberPhase::Created {
            return Ok(Progress::pending());
        }
        let snapshot = ctx.cached_snapshot().await;
        Ok(match snapshot.member_pod(&member) {
            Some(pod) if is_pod_ready(pod) => Progress::ready(),
            _ => Progress::pending(),
        })
    }
}

// ── RuntimeContainerImageUpdate ────────────────────────────────────

planned_action!(RuntimeContainerImageUpdate);

impl RuntimeContainerImageUpdate {
    fn image(&self) -> ActionResult<&str> {
        self.action
            .param(PARAM_IMAGE)
            .ok_or(ActionError::MissingParam {
                action: self.action.type_,
                param: PARAM_IMAGE,
            })
    }
}

#[async_trait]
impl Action for RuntimeContainerImageUpdate {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        let image = self.image()?;
        let id = &self.action.member_id;
        let Some((_, member)) = ctx.member_status_by_id(id).await? else {
            return Ok(true);
        };
        let Some(pod) = member.pod_name else {
            return Ok(true);
        };

        ctx.update_pod_image(&pod, SERVER_CONTAINER_NAME, image).await?;
        ctx.with_status_update(|status| {
            let Some(m) = status.members.find_mut(id) else {
                return false;
            };
            m.phase = MemberPhase::Upgrading;
            m.image = Some(image.to_string());
            true
        })
        .await?;
        info!(deployment = %ctx.name(), member = %id, %image, "container image patched in place");
        Ok(false)
    }

    async fn check_progress(&self, ctx: &DeploymentContext) -> ActionResult<Progress> {
        let image = self.image()?;
        let id = &self.action.member_id;
        let Some((_, member)) = ctx.member_status_by_id(id).await? else {
            return Ok(Progress::ready());
        };
        let snapshot = ctx.cached_snapshot().await;
        let Some(pod) = snapshot.member_pod(&member) else {
            return Ok(Progress::pending());
        };
        let running = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.iter().find(|c| c.name == SERVER_CONTAINER_NAME))
            .and_then(|c| c.image.as_deref())
            == Some(image);
        if !running || !is_pod_ready(pod) {
            return Ok(Progress::pending());
        }
        ctx.with_status_update(|status| match status.members.find_mut(id) {
            Some(m) if m.phase == MemberPhase::Upgrading => {
                m.phase = MemberPhase::Created;
                true
            }
            _ => false,
        })
        .await?;
        Ok(Progress::ready())
    }
}
