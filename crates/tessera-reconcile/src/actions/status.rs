//! Actions that only write the deployment status.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use tessera_state::Action as PlannedAction;

use crate::action::Action;
use crate::actions::PARAM_CHECKSUM;
use crate::context::DeploymentContext;
use crate::error::ActionResult;

planned_action!(MemberPodStatusUpdate);

#[async_trait]
impl Action for MemberPodStatusUpdate {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        let id = &self.action.member_id;
        let current = ctx.read().await?;
        let Some((group, member)) = current.status.members.find(id) else {
            return Ok(true);
        };
        let desired = ctx.desired_template(&current.spec, group, member)?;

        // The spec moved on since planning; the next plan covers it.
        if self.action.param(PARAM_CHECKSUM) != Some(desired.checksum.as_str()) {
            debug!(
                deployment = %ctx.name(),
                member = %id,
                planned = self.action.param(PARAM_CHECKSUM).unwrap_or_default(),
                desired = %desired.checksum,
                "stale template checksum, skipping",
            );
            return Ok(true);
        }

        let changed = ctx
            .with_status_update(|status| {
                let Some(m) = status.members.find_mut(id) else {
                    return false;
                };
                let same_template = m.template.as_ref().is_some_and(|t| t.equals(&desired));
                if same_template && m.pod_spec_version.as_deref() == Some(desired.checksum.as_str()) {
                    return false;
                }
                m.template = Some(desired.clone());
                m.pod_spec_version = Some(desired.checksum.clone());
                true
            })
            .await?;
        if changed {
            info!(deployment = %ctx.name(), member = %id, checksum = %desired.checksum, "member template updated");
        }
        Ok(true)
    }
}

planned_action!(EncryptionKeyStatusUpdate);

#[async_trait]
impl Action for EncryptionKeyStatusUpdate {
    fn planned(&self) -> &PlannedAction {
        &self.action
    }

    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool> {
        let current = ctx.read().await?;
        let Some(secret) = current.spec.encryption_key_secret.as_deref() else {
            return Ok(true);
        };
        let keys = match ctx.encryption_key_hashes(secret).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(deployment = %ctx.name(), %secret, error = %e, "unable to read encryption keys");
                return Ok(true);
            }
        };
        let keys = (!keys.is_empty()).then_some(keys);
        ctx.with_status_update(|status| {
            if status.hashes.encryption.keys == keys {
                return false;
            }
            status.hashes.encryption.keys = keys.clone();
            true
        })
        .await?;
        Ok(true)
    }
}
