//! Resource inspection: bring member status and pods in line before planning.
//!
//! Runs every pass, before the plan is built or executed:
//!
//! 1. release finalizers of terminating pods that are no longer served,
//! 2. forget pods that vanished and track pod readiness,
//! 3. create pods for `Pending` members of active groups, replacing a
//!    leftover pod of the same name built from another template,
//! 4. move the deployment to `Running` once every desired member is up.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use tessera_pod::{build_pod, pod_spec_version};
use tessera_pod::constants::{
    ANNOTATION_MEMBER_ID, FINALIZER_DELAY_POD_TERMINATION, FINALIZER_GRACEFUL_SHUTDOWN,
};
use tessera_state::{
    ConditionType, DeploymentPhase, DeploymentStatus, MemberPhase, MemberStatus, ServerGroup,
    Versioned,
};

use crate::context::{ClusterSnapshot, DeploymentContext, has_finalizer, is_pod_ready, is_terminating};
use crate::error::{ReconcileResult, ResourceError};

/// What inspection changed in the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inspection {
    pub pods_created: usize,
    pub pods_deleted: usize,
    pub finalizers_removed: usize,
}

impl Inspection {
    /// The snapshot is stale and should be refreshed before planning.
    pub fn touched_cluster(&self) -> bool {
        self.pods_created > 0 || self.pods_deleted > 0 || self.finalizers_removed > 0
    }
}

pub async fn inspect_resources(
    ctx: &DeploymentContext,
    current: &Versioned,
) -> ReconcileResult<Inspection> {
    let snapshot = ctx.cached_snapshot().await;
    let mut inspection = Inspection {
        finalizers_removed: release_finalizers(ctx, &current.status, &snapshot).await?,
        ..Default::default()
    };

    sync_member_pods(ctx, &snapshot).await?;

    let fresh = ctx.read().await?;
    for group in current.spec.active_groups() {
        let pending = fresh
            .status
            .members
            .group(group)
            .iter()
            .filter(|m| m.phase == MemberPhase::Pending && m.pod_name.is_none())
            .filter(|m| !m.conditions.is_true(ConditionType::Terminating));
        for member in pending {
            match create_member_pod(ctx, current, &snapshot, group, member).await? {
                PodOutcome::Created => inspection.pods_created += 1,
                PodOutcome::Replaced => inspection.pods_deleted += 1,
                PodOutcome::Waiting => {}
            }
        }
    }

    update_deployment_phase(ctx, current).await?;
    Ok(inspection)
}

// ── Finalizers ─────────────────────────────────────────────────────

/// Finalizers of a terminating pod that can be dropped now.
fn releasable_finalizers(
    status: &DeploymentStatus,
    pod: &k8s_openapi::api::core::v1::Pod,
) -> Vec<String> {
    let member = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_MEMBER_ID))
        .and_then(|id| status.members.find(id))
        .map(|(_, m)| m);
    let served = member.is_some_and(|m| {
        m.pod_name.as_deref() == pod.metadata.name.as_deref()
            && !m.conditions.is_true(ConditionType::Terminating)
    });
    let stopped = !is_pod_ready(pod);

    let mut release = Vec::new();
    if has_finalizer(pod, FINALIZER_GRACEFUL_SHUTDOWN) && (!served || stopped) {
        release.push(FINALIZER_GRACEFUL_SHUTDOWN.to_string());
    }
    if has_finalizer(pod, FINALIZER_DELAY_POD_TERMINATION) && stopped {
        release.push(FINALIZER_DELAY_POD_TERMINATION.to_string());
    }
    release
}

async fn release_finalizers(
    ctx: &DeploymentContext,
    status: &DeploymentStatus,
    snapshot: &ClusterSnapshot,
) -> ReconcileResult<usize> {
    let mut removed = 0;
    for pod in snapshot.pods.iter().filter(|p| is_terminating(p)) {
        let Some(name) = pod.metadata.name.as_deref() else {
            continue;
        };
        let release = releasable_finalizers(status, pod);
        if release.is_empty() {
            continue;
        }
        match ctx.remove_pod_finalizers(name, &release).await {
            Ok(()) => {
                debug!(deployment = %ctx.name(), pod = %name, finalizers = ?release, "finalizers removed");
                removed += 1;
            }
            Err(ResourceError::NotFound(_)) => {}
            Err(e) => {
                warn!(deployment = %ctx.name(), pod = %name, error = %e, "unable to remove finalizers");
            }
        }
    }
    Ok(removed)
}

// ── Member pods ────────────────────────────────────────────────────

/// Forget vanished pods and mirror pod readiness into member conditions.
async fn sync_member_pods(ctx: &DeploymentContext, snapshot: &ClusterSnapshot) -> ReconcileResult<()> {
    ctx.with_status_update(|status| {
        let plan_empty = status.plan.is_empty();
        let mut changed = false;
        for group in ServerGroup::ALL {
            for m in status.members.group_mut(group).iter_mut() {
                let Some(pod_name) = m.pod_name.as_deref() else {
                    continue;
                };
                match snapshot.pod(pod_name) {
                    // A rotation in flight resets the member itself.
                    None if m.conditions.is_true(ConditionType::Terminating) && !plan_empty => {}
                    None => {
                        m.clear_pod();
                        changed = true;
                    }
                    Some(pod) => {
                        let ready = is_pod_ready(pod) && !is_terminating(pod);
                        let (reason, message) = if ready {
                            ("PodReady", "Pod is ready")
                        } else {
                            ("PodNotReady", "Pod is not ready")
                        };
                        changed |= m.conditions.update(ConditionType::Ready, ready, reason, message);
                    }
                }
            }
        }
        changed
    })
    .await?;
    Ok(())
}

enum PodOutcome {
    Created,
    /// A stale pod was deleted; the member gets its pod on a later pass.
    Replaced,
    Waiting,
}

/// Create the pod of one pending member, then record it.
///
/// An existing pod of the same name is adopted only when it was built from
/// the desired template. Any other pod is deleted first.
async fn create_member_pod(
    ctx: &DeploymentContext,
    current: &Versioned,
    snapshot: &ClusterSnapshot,
    group: ServerGroup,
    member: &MemberStatus,
) -> ReconcileResult<PodOutcome> {
    let id = member.id.as_str();
    let template = ctx.desired_template(&current.spec, group, member)?;
    let pod = build_pod(ctx.render(), &template, group, member)?;
    let Some(name) = pod.metadata.name.clone() else {
        return Ok(PodOutcome::Waiting);
    };

    let created = match snapshot.pod(&name) {
        Some(existing) if is_terminating(existing) => {
            debug!(deployment = %ctx.name(), pod = %name, "previous pod still terminating");
            return Ok(PodOutcome::Waiting);
        }
        Some(existing) if pod_spec_version(existing) != Some(template.checksum.as_str()) => {
            info!(
                deployment = %ctx.name(),
                member = %id,
                pod = %name,
                found = ?pod_spec_version(existing),
                "deleting pod built from another template"
            );
            return match ctx.delete_pod(&name).await {
                Ok(()) => Ok(PodOutcome::Replaced),
                Err(e) => {
                    warn!(deployment = %ctx.name(), pod = %name, error = %e, "unable to delete stale pod");
                    Ok(PodOutcome::Waiting)
                }
            };
        }
        Some(existing) => existing.clone(),
        None => match ctx.create_pod(pod).await {
            Ok(created) => created,
            Err(e) => {
                warn!(deployment = %ctx.name(), member = %id, pod = %name, error = %e, "unable to create pod");
                return Ok(PodOutcome::Waiting);
            }
        },
    };

    let image = current.spec.image.clone();
    let uid = created.metadata.uid.clone();
    ctx.with_status_update(|status| {
        let Some(m) = status.members.find_mut(id) else {
            return false;
        };
        m.pod_name = Some(name.clone());
        m.pod_uid = uid.clone();
        m.pod_spec_version = Some(template.checksum.clone());
        m.template = Some(template.clone());
        m.image = Some(image.clone());
        m.phase = MemberPhase::Created;
        m.conditions.remove(ConditionType::ActionFailed);
        true
    })
    .await?;
    info!(deployment = %ctx.name(), %group, member = %id, pod = %name, "member pod created");
    Ok(PodOutcome::Created)
}

// ── Deployment phase ───────────────────────────────────────────────

async fn update_deployment_phase(ctx: &DeploymentContext, current: &Versioned) -> ReconcileResult<()> {
    let desired: BTreeMap<ServerGroup, u32> = current
        .spec
        .active_groups()
        .into_iter()
        .map(|g| (g, current.spec.desired_count(g)))
        .collect();
    ctx.with_status_update(|status| {
        if status.phase != DeploymentPhase::None {
            return false;
        }
        let all_up = desired.iter().all(|(group, count)| {
            let members = status.members.group(*group);
            members.len() == *count as usize
                && members.iter().all(|m| m.phase == MemberPhase::Created)
        });
        if !all_up {
            return false;
        }
        status.phase = DeploymentPhase::Running;
        true
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn terminating_pod(member: &str, finalizers: &[&str], ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(format!("db-dbserver-{}", member.to_lowercase())),
                annotations: Some([(ANNOTATION_MEMBER_ID.to_string(), member.to_string())].into()),
                finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
                deletion_timestamp: Some(Time(k8s_openapi::chrono::Utc::now())),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    fn status_with(member: MemberStatus) -> DeploymentStatus {
        let mut status = DeploymentStatus::default();
        status.members.add(ServerGroup::DBServers, member);
        status
    }

    #[test]
    fn graceful_finalizer_kept_while_member_serves_ready_pod() {
        let pod = terminating_pod("PRMR-1", &[FINALIZER_GRACEFUL_SHUTDOWN], true);
        let mut member = MemberStatus::new("PRMR-1");
        member.pod_name = pod.metadata.name.clone();
        assert!(releasable_finalizers(&status_with(member), &pod).is_empty());
    }

    #[test]
    fn graceful_finalizer_released_for_removed_member() {
        let pod = terminating_pod("PRMR-1", &[FINALIZER_GRACEFUL_SHUTDOWN], true);
        assert_eq!(
            releasable_finalizers(&DeploymentStatus::default(), &pod),
            vec![FINALIZER_GRACEFUL_SHUTDOWN.to_string()]
        );
    }

    #[test]
    fn stopped_pod_releases_both_finalizers() {
        let pod = terminating_pod(
            "PRMR-1",
            &[FINALIZER_GRACEFUL_SHUTDOWN, FINALIZER_DELAY_POD_TERMINATION],
            false,
        );
        let mut member = MemberStatus::new("PRMR-1");
        member.pod_name = pod.metadata.name.clone();
        assert_eq!(releasable_finalizers(&status_with(member), &pod).len(), 2);
    }
}
