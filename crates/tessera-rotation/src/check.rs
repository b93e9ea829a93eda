//! Rotation decision for a single member.

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};

use tessera_pod::constants::{
    ANNOTATION_ROTATE, FINALIZER_DELAY_POD_TERMINATION, FINALIZER_GRACEFUL_SHUTDOWN,
};
use tessera_state::{
    ConditionType, DeploymentSpec, MemberPodTemplate, MemberPropagationMode, MemberStatus, Plan,
    ServerGroup,
};

use crate::compare::compare;
use crate::error::RotationResult;
use crate::mode::RotationMode;

/// Outcome of a rotation check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rotation {
    pub mode: RotationMode,
    /// Actions contributed by comparators (in-place updates).
    pub plan: Plan,
    pub reason: String,
}

impl Rotation {
    fn skipped() -> Self {
        Self::default()
    }

    fn enforced(reason: &str) -> Self {
        Self {
            mode: RotationMode::Enforced,
            plan: Plan::new(),
            reason: reason.to_string(),
        }
    }
}

/// Everything the decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct RotationInput<'a> {
    pub spec: &'a DeploymentSpec,
    pub group: ServerGroup,
    pub member: &'a MemberStatus,
    /// Live pod of the member, if one exists.
    pub pod: Option<&'a Pod>,
    /// Live data volume claim of the member, if one exists.
    pub pvc: Option<&'a PersistentVolumeClaim>,
    pub desired: Option<&'a MemberPodTemplate>,
    pub applied: Option<&'a MemberPodTemplate>,
}

/// Whether a member can be inspected at all.
pub fn check_possible(member: &MemberStatus) -> bool {
    !member.conditions.is_true(ConditionType::Terminated)
}

fn has_finalizer(pod: &Pod, name: &str) -> bool {
    pod.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == name))
}

/// Whether a claim is waiting for a filesystem resize on next mount.
pub fn is_filesystem_resize_pending(pvc: &PersistentVolumeClaim) -> bool {
    pvc.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "FileSystemResizePending" && c.status == "True")
        })
}

/// Decide how `member` must be rotated. The first matching rule wins.
pub fn is_rotation_required(input: &RotationInput<'_>) -> RotationResult<Rotation> {
    let member = input.member;

    // Under termination nothing else is inspected.
    if let Some(pod) = input.pod
        && (member.conditions.is_true(ConditionType::Terminating)
            || pod.metadata.deletion_timestamp.is_some())
    {
        if has_finalizer(pod, FINALIZER_GRACEFUL_SHUTDOWN)
            && !has_finalizer(pod, FINALIZER_DELAY_POD_TERMINATION)
        {
            return Ok(Rotation::enforced("Recreation enforced by deleted state"));
        }
        return Ok(Rotation::skipped());
    }

    if !check_possible(member) {
        return Ok(Rotation::skipped());
    }

    if input.spec.member_propagation_mode == MemberPropagationMode::Always
        && member.conditions.is_true(ConditionType::PendingRestart)
    {
        return Ok(Rotation::enforced("Restart is pending"));
    }

    if let Some(pod) = input.pod {
        if member.pod_uid.as_deref() != pod.metadata.uid.as_deref() {
            return Ok(Rotation::enforced(
                "Pod UID does not match, this pod is not managed by the operator. Recreating",
            ));
        }
        if pod
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(ANNOTATION_ROTATE))
        {
            return Ok(Rotation::enforced("Recreation enforced by annotation"));
        }
    }

    if !member.has_pod_spec_version() {
        return Ok(Rotation::enforced("Pod spec version is empty - recreating pod"));
    }

    let (Some(desired), Some(applied)) = (input.desired, input.applied) else {
        return Ok(Rotation::skipped());
    };

    if member.conditions.is_true(ConditionType::PendingTlsRotation) {
        return Ok(Rotation::enforced("TLS rotation pending"));
    }

    if input.pvc.is_some_and(is_filesystem_resize_pending) {
        return Ok(Rotation::enforced("PVC resize pending"));
    }

    let (mode, plan) = compare(member, input.group, desired, applied)?;
    Ok(Rotation {
        mode,
        plan,
        reason: "Pod needs rotation".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{
        Container, PersistentVolumeClaimCondition, PersistentVolumeClaimStatus, PodSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use tessera_pod::constants::SERVER_CONTAINER_NAME;

    fn template(image: &str) -> MemberPodTemplate {
        let spec = PodSpec {
            containers: vec![Container {
                name: SERVER_CONTAINER_NAME.to_string(),
                image: Some(image.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        MemberPodTemplate::new(spec, BTreeMap::new(), BTreeMap::new()).unwrap()
    }

    fn member() -> MemberStatus {
        let mut m = MemberStatus::new("PRMR-1");
        m.pod_uid = Some("uid-1".to_string());
        m.pod_spec_version = Some("v1".to_string());
        m
    }

    fn pod(uid: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("db-dbserver-prmr-1".to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    struct Case {
        spec: DeploymentSpec,
        member: MemberStatus,
        pod: Option<Pod>,
        pvc: Option<PersistentVolumeClaim>,
        desired: Option<MemberPodTemplate>,
        applied: Option<MemberPodTemplate>,
    }

    impl Case {
        fn new() -> Self {
            Self {
                spec: DeploymentSpec::default(),
                member: member(),
                pod: Some(pod("uid-1")),
                pvc: None,
                desired: Some(template("db:1")),
                applied: Some(template("db:1")),
            }
        }

        fn check(&self) -> Rotation {
            is_rotation_required(&RotationInput {
                spec: &self.spec,
                group: ServerGroup::DBServers,
                member: &self.member,
                pod: self.pod.as_ref(),
                pvc: self.pvc.as_ref(),
                desired: self.desired.as_ref(),
                applied: self.applied.as_ref(),
            })
            .unwrap()
        }
    }

    #[test]
    fn up_to_date_member_is_skipped() {
        let r = Case::new().check();
        assert_eq!(r.mode, RotationMode::Skipped);
        assert_eq!(r.reason, "Pod needs rotation");
    }

    #[test]
    fn terminating_with_graceful_finalizer_is_enforced() {
        let mut case = Case::new();
        case.member
            .conditions
            .update(ConditionType::Terminating, true, "", "");
        let pod = case.pod.as_mut().unwrap();
        pod.metadata.finalizers = Some(vec![FINALIZER_GRACEFUL_SHUTDOWN.to_string()]);
        assert_eq!(case.check().mode, RotationMode::Enforced);

        // Delayed termination holds the member; nothing else is inspected.
        case.pod.as_mut().unwrap().metadata.finalizers = Some(vec![
            FINALIZER_GRACEFUL_SHUTDOWN.to_string(),
            FINALIZER_DELAY_POD_TERMINATION.to_string(),
        ]);
        case.member.conditions.update(ConditionType::PendingTlsRotation, true, "", "");
        assert_eq!(case.check().mode, RotationMode::Skipped);
    }

    #[test]
    fn terminated_member_is_skipped() {
        let mut case = Case::new();
        case.member.conditions.update(ConditionType::Terminated, true, "", "");
        case.member.pod_spec_version = None;
        assert_eq!(case.check().mode, RotationMode::Skipped);
    }

    #[test]
    fn pending_restart_depends_on_propagation_mode() {
        let mut case = Case::new();
        case.member.conditions.update(ConditionType::PendingRestart, true, "", "");
        let r = case.check();
        assert_eq!(r.mode, RotationMode::Enforced);
        assert_eq!(r.reason, "Restart is pending");

        case.spec.member_propagation_mode = MemberPropagationMode::OnRestart;
        assert_eq!(case.check().mode, RotationMode::Skipped);
    }

    #[test]
    fn uid_mismatch_wins_over_tls_rotation() {
        let mut case = Case::new();
        case.pod = Some(pod("uid-other"));
        case.member.conditions.update(ConditionType::PendingTlsRotation, true, "", "");
        let r = case.check();
        assert_eq!(r.mode, RotationMode::Enforced);
        assert!(r.reason.starts_with("Pod UID does not match"));
    }

    #[test]
    fn rotate_annotation_is_enforced() {
        let mut case = Case::new();
        case.pod.as_mut().unwrap().metadata.annotations =
            Some(BTreeMap::from([(ANNOTATION_ROTATE.to_string(), "".to_string())]));
        assert_eq!(case.check().reason, "Recreation enforced by annotation");
    }

    #[test]
    fn missing_version_is_enforced_but_missing_template_is_skipped() {
        let mut case = Case::new();
        case.member.pod_spec_version = None;
        case.applied = None;
        assert_eq!(case.check().mode, RotationMode::Enforced);

        let mut case = Case::new();
        case.applied = None;
        case.member.conditions.update(ConditionType::PendingTlsRotation, true, "", "");
        assert_eq!(case.check().mode, RotationMode::Skipped);
    }

    #[test]
    fn tls_rotation_is_enforced() {
        let mut case = Case::new();
        case.member.conditions.update(ConditionType::PendingTlsRotation, true, "", "");
        assert_eq!(case.check().reason, "TLS rotation pending");
    }

    #[test]
    fn pvc_resize_is_enforced() {
        let mut case = Case::new();
        case.pvc = Some(PersistentVolumeClaim {
            status: Some(PersistentVolumeClaimStatus {
                conditions: Some(vec![PersistentVolumeClaimCondition {
                    type_: "FileSystemResizePending".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(case.check().reason, "PVC resize pending");
    }

    #[test]
    fn image_change_without_pod_is_in_place() {
        let mut case = Case::new();
        case.pod = None;
        case.desired = Some(template("db:2"));
        let r = case.check();
        assert_eq!(r.mode, RotationMode::InPlace);
        assert_eq!(r.plan.len(), 1);
    }
}
