//! Toggling the cluster scaling integration around member removal.

use async_trait::async_trait;
use tracing::debug;

use tessera_state::Action as PlannedAction;

use crate::action::Action;
use crate::context::DeploymentContext;
use crate::error::ActionResult;

planned_action!(DisableClusterScaling);

#[async_trait]
impl Action for DisableClusterScaling {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        match ctx.scaling() {
            Some(scaling) => scaling.disable().await?,
            None => debug!(deployment = %ctx.name(), "no scaling integration"),
        }
        Ok(true)
    }
}

planned_action!(EnableClusterScaling);

#[async_trait]
impl Action for EnableClusterScaling {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        match ctx.scaling() {
            Some(scaling) => scaling.enable().await?,
            None => debug!(deployment = %ctx.name(), "no scaling integration"),
        }
        Ok(true)
    }
}
