//! Adding and removing members.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use tessera_state::{Action as PlannedAction, MemberStatus};

use crate::action::Action;
use crate::context::DeploymentContext;
use crate::error::{ActionResult, ResourceError};

planned_action!(AddMember);

#[async_trait]
impl Action for AddMember {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        let Some(group) = self.action.group else {
            warn!(deployment = %ctx.name(), "AddMember without group, skipping");
            return Ok(true);
        };
        let id = self.action.member_id.clone();
        let added = ctx
            .with_status_update(|status| {
                if status.members.find(&id).is_some() {
                    return false;
                }
                status.members.add(group, MemberStatus::new(id.clone()));
                true
            })
            .await?;
        if added {
            info!(deployment = %ctx.name(), %group, member = %id, "member added");
        }
        Ok(true)
    }
}

planned_action!(RemoveMember);

#[async_trait]
impl Action for RemoveMember {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15 * 60)
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        let id = &self.action.member_id;
        let Some((group, member)) = ctx.member_status_by_id(id).await? else {
            return Ok(true);
        };

        if let Some(pod) = &member.pod_name {
            match ctx.delete_pod(pod).await {
                Ok(()) | Err(ResourceError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        ctx.with_status_update(|status| status.members.remove(id).is_some())
            .await?;
        info!(deployment = %ctx.name(), %group, member = %id, "member removed");
        Ok(true)
    }
}
