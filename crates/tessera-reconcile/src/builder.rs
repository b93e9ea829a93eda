//! Plan builder.
//!
//! Steps in priority order; a step marked `if_empty` only runs while
//! nothing has been planned:
//!
//! ```text
//! failed_members      apply
//! scale               apply_if_empty
//! encryption_status   apply_with_condition_if_empty  (secret configured)
//! rotation            apply_sub_plan_if_empty        (first_non_empty per group)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use tessera_pod::{RenderContext, render_member_template};
use tessera_rotation::{RotationInput, RotationMode, is_rotation_required};
use tessera_state::{
    Action, ActionType, DeploymentSpec, DeploymentStatus, MemberPhase, MemberStatus, Plan,
    ServerGroup,
};

use crate::actions::PARAM_CHECKSUM;
use crate::appender::{PlanAppender, SubStep, first_non_empty};
use crate::context::ClusterSnapshot;
use crate::error::{PlanError, PlanResult};

/// Everything a plan is built from. Builder steps do no I/O.
pub struct PlanContext<'a> {
    pub deployment: &'a str,
    pub spec: &'a DeploymentSpec,
    pub status: &'a DeploymentStatus,
    pub snapshot: &'a ClusterSnapshot,
    pub render: &'a RenderContext,
    /// Key hashes read from the encryption secret, when one is configured.
    pub encryption_keys: Option<Result<Vec<String>, String>>,
}

static MEMBER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh member id, e.g. `PRMR-1a2b3c4d`.
pub fn new_member_id(group: ServerGroup) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = MEMBER_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", group.id_prefix(), &digest[..8])
}

pub fn build_plan(ctx: &PlanContext<'_>) -> Plan {
    let rotation: Vec<SubStep<'_, PlanContext<'_>>> = ctx
        .spec
        .active_groups()
        .into_iter()
        .map(rotation_step)
        .collect();

    let plan = PlanAppender::new(ctx, Plan::new())
        .apply("failed_members", failed_members)
        .apply_if_empty("scale", scale)
        .apply_with_condition_if_empty(
            "encryption_status",
            |c| c.spec.encryption_key_secret.is_some(),
            encryption_status,
        )
        .apply_sub_plan_if_empty("rotation", first_non_empty, &rotation)
        .plan();

    if !plan.is_empty() {
        debug!(deployment = %ctx.deployment, actions = ?plan.types(), "plan built");
    }
    plan
}

// ── Steps ──────────────────────────────────────────────────────────

fn failed_members(ctx: &PlanContext<'_>) -> PlanResult<Plan> {
    let mut plan = Plan::new();
    for group in ctx.spec.active_groups() {
        for member in ctx.status.members.group(group) {
            if member.phase != MemberPhase::Failed {
                continue;
            }
            plan.push(
                Action::new(ActionType::RemoveMember, group, member.id.clone())
                    .with_reason("Member failed"),
            );
            plan.push(
                Action::new(ActionType::AddMember, group, new_member_id(group))
                    .with_reason("Replacing failed member"),
            );
        }
    }
    Ok(plan)
}

/// Most recently created member; ties go to the later position.
fn newest(members: &[MemberStatus]) -> Option<&MemberStatus> {
    members.iter().max_by_key(|m| m.created_at)
}

fn scale(ctx: &PlanContext<'_>) -> PlanResult<Plan> {
    let mut plan = Plan::new();
    for group in ServerGroup::ALL {
        let members = ctx.status.members.group(group);
        let desired = ctx.spec.desired_count(group) as usize;

        if members.len() < desired {
            for _ in members.len()..desired {
                plan.push(
                    Action::new(ActionType::AddMember, group, new_member_id(group))
                        .with_reason("Scaling up"),
                );
            }
            continue;
        }

        // One member per plan on the way down.
        if members.len() > desired
            && let Some(victim) = newest(members)
        {
            plan.push(Action::for_deployment(ActionType::DisableClusterScaling));
            plan.push(
                Action::new(ActionType::RemoveMember, group, victim.id.clone())
                    .with_reason("Scaling down"),
            );
            plan.push(Action::for_deployment(ActionType::EnableClusterScaling));
            return Ok(plan);
        }
    }
    Ok(plan)
}

fn encryption_status(ctx: &PlanContext<'_>) -> PlanResult<Plan> {
    let keys = match &ctx.encryption_keys {
        None => return Ok(Plan::new()),
        Some(Err(e)) => return Err(PlanError::Step(format!("encryption keys: {e}"))),
        Some(Ok(keys)) => keys,
    };
    let current = ctx.status.hashes.encryption.keys.as_deref().unwrap_or_default();
    if current == keys.as_slice() {
        return Ok(Plan::new());
    }
    Ok(Plan::from(vec![
        Action::for_deployment(ActionType::EncryptionKeyStatusUpdate)
            .with_reason("Encryption keys changed"),
    ]))
}

fn rotation_step<'s, 'a>(group: ServerGroup) -> SubStep<'s, PlanContext<'a>> {
    Box::new(move |c: &PlanContext<'a>| rotation_for_group(c, group))
}

fn rotation_for_group(ctx: &PlanContext<'_>, group: ServerGroup) -> PlanResult<Plan> {
    for member in ctx.status.members.group(group) {
        if member.phase != MemberPhase::Created {
            continue;
        }
        let desired = render_member_template(ctx.render, ctx.spec, group, member)?;
        let input = RotationInput {
            spec: ctx.spec,
            group,
            member,
            pod: ctx.snapshot.member_pod(member),
            pvc: ctx.snapshot.member_pvc(member),
            desired: Some(&desired),
            applied: member.template.as_ref(),
        };
        let rotation = match is_rotation_required(&input) {
            Ok(rotation) => rotation,
            Err(e) => {
                warn!(deployment = %ctx.deployment, member = %member.id, error = %e, "rotation check failed, skipping member");
                continue;
            }
        };
        if rotation.mode.is_skipped() {
            continue;
        }
        debug!(
            deployment = %ctx.deployment,
            member = %member.id,
            mode = %rotation.mode,
            reason = %rotation.reason,
            "member needs rotation",
        );
        return Ok(rotation_plan(
            group,
            member,
            rotation.mode,
            rotation.plan,
            &rotation.reason,
            &desired.checksum,
        ));
    }
    Ok(Plan::new())
}

/// Actions applying a rotation of `mode` to one member.
pub fn rotation_plan(
    group: ServerGroup,
    member: &MemberStatus,
    mode: RotationMode,
    comparator_plan: Plan,
    reason: &str,
    checksum: &str,
) -> Plan {
    let action = |ty| Action::new(ty, group, member.id.clone()).with_reason(reason);
    let mut plan = Plan::new();
    match mode {
        RotationMode::Skipped => return plan,
        RotationMode::Silent => {}
        RotationMode::InPlace => plan.append(comparator_plan),
        RotationMode::Graceful => {
            plan.push(action(ActionType::RotateMember));
            plan.push(action(ActionType::WaitForMemberUp));
        }
        RotationMode::Enforced => {
            plan.push(action(ActionType::KillMemberPod));
            plan.push(action(ActionType::RotateMember));
            plan.push(action(ActionType::WaitForMemberUp));
        }
    }
    plan.push(action(ActionType::MemberPodStatusUpdate).with_param(PARAM_CHECKSUM, checksum));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_state::ServerGroupSpec;

    fn spec() -> DeploymentSpec {
        DeploymentSpec {
            image: "arangodb/arangodb:3.11".to_string(),
            coordinators: ServerGroupSpec::with_count(3).with_bounds(2, 5),
            ..Default::default()
        }
    }

    fn build(spec: &DeploymentSpec, status: &DeploymentStatus) -> Plan {
        let snapshot = ClusterSnapshot::default();
        let render = RenderContext::new("db", "default");
        build_plan(&PlanContext {
            deployment: "db",
            spec,
            status,
            snapshot: &snapshot,
            render: &render,
            encryption_keys: None,
        })
    }

    fn populated(spec: &DeploymentSpec) -> DeploymentStatus {
        let mut status = DeploymentStatus::default();
        for group in spec.active_groups() {
            for i in 0..spec.desired_count(group) {
                let mut m = MemberStatus::new(format!("{}-{i}", group.id_prefix()));
                m.created_at = u64::from(i);
                status.members.add(group, m);
            }
        }
        status
    }

    #[test]
    fn member_ids_are_prefixed_and_unique() {
        let a = new_member_id(ServerGroup::DBServers);
        let b = new_member_id(ServerGroup::DBServers);
        assert!(a.starts_with("PRMR-"));
        assert_eq!(a.len(), "PRMR-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_deployment_scales_up() {
        let plan = build(&spec(), &DeploymentStatus::default());
        assert_eq!(plan.len(), 9);
        assert!(plan.iter().all(|a| a.type_ == ActionType::AddMember));
    }

    #[test]
    fn scale_down_removes_newest_between_scaling_toggles() {
        let mut spec = spec();
        let status = populated(&spec);
        spec.coordinators.count = Some(2);

        let plan = build(&spec, &status);
        assert_eq!(
            plan.types(),
            vec![
                ActionType::DisableClusterScaling,
                ActionType::RemoveMember,
                ActionType::EnableClusterScaling,
            ]
        );
        let removed = plan.iter().nth(1).unwrap();
        assert_eq!(removed.member_id, "CRDN-2");
        assert_eq!(removed.group, Some(ServerGroup::Coordinators));
        assert_eq!(plan.first().unwrap().group, None);
    }

    #[test]
    fn failed_member_is_replaced_before_scaling() {
        let mut spec = spec();
        let mut status = populated(&spec);
        status.members.find_mut("PRMR-1").unwrap().phase = MemberPhase::Failed;
        spec.coordinators.count = Some(4);

        let plan = build(&spec, &status);
        assert_eq!(plan.types(), vec![ActionType::RemoveMember, ActionType::AddMember]);
        assert_eq!(plan.first().unwrap().member_id, "PRMR-1");
    }

    #[test]
    fn encryption_hash_change_is_planned() {
        let mut spec = spec();
        spec.encryption_key_secret = Some("keys".to_string());
        let status = populated(&spec);
        let snapshot = ClusterSnapshot::default();
        let render = RenderContext::new("db", "default");
        let mut ctx = PlanContext {
            deployment: "db",
            spec: &spec,
            status: &status,
            snapshot: &snapshot,
            render: &render,
            encryption_keys: Some(Ok(vec!["abc".to_string()])),
        };
        assert_eq!(
            build_plan(&ctx).types(),
            vec![ActionType::EncryptionKeyStatusUpdate]
        );

        ctx.encryption_keys = Some(Err("secret missing".to_string()));
        assert!(build_plan(&ctx).is_empty());
    }

    #[test]
    fn rotation_plans_by_mode() {
        let member = MemberStatus::new("CRDN-1");
        let group = ServerGroup::Coordinators;
        let types = |mode| rotation_plan(group, &member, mode, Plan::new(), "r", "sum").types();

        assert!(types(RotationMode::Skipped).is_empty());
        assert_eq!(types(RotationMode::Silent), vec![ActionType::MemberPodStatusUpdate]);
        assert_eq!(
            types(RotationMode::Graceful),
            vec![
                ActionType::RotateMember,
                ActionType::WaitForMemberUp,
                ActionType::MemberPodStatusUpdate,
            ]
        );
        assert_eq!(
            types(RotationMode::Enforced),
            vec![
                ActionType::KillMemberPod,
                ActionType::RotateMember,
                ActionType::WaitForMemberUp,
                ActionType::MemberPodStatusUpdate,
            ]
        );

        let in_place = Plan::from(vec![Action::new(
            ActionType::RuntimeContainerImageUpdate,
            group,
            "CRDN-1",
        )]);
        let plan = rotation_plan(group, &member, RotationMode::InPlace, in_place, "r", "sum");
        assert_eq!(
            plan.types(),
            vec![
                ActionType::RuntimeContainerImageUpdate,
                ActionType::MemberPodStatusUpdate,
            ]
        );
        assert_eq!(
            plan.iter().last().unwrap().param(PARAM_CHECKSUM),
            Some("sum")
        );
    }
}
