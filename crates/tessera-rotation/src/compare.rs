//! Field comparators between the desired and the last-applied pod spec.
//!
//! Each comparator looks at one group of fields. When they differ it
//! moves the applied copy toward the desired spec, may queue actions, and
//! reports the minimal mode needed for that change. Comparators compute
//! before they mutate, so a failing comparator leaves the copy untouched.

use k8s_openapi::api::core::v1::{Container, PodSpec};
use tracing::debug;

use tessera_pod::constants::SERVER_CONTAINER_NAME;
use tessera_state::{
    Action, ActionType, MemberPodTemplate, MemberStatus, Plan, ServerGroup, pod_spec_checksum,
    sha256_json,
};

use crate::error::{RotationError, RotationResult};
use crate::mode::RotationMode;

/// Parameter of `RuntimeContainerImageUpdate` naming the target image.
pub const PARAM_IMAGE: &str = "image";

struct Target<'a> {
    member: &'a MemberStatus,
    group: ServerGroup,
    plan: &'a mut Plan,
}

type Comparator = fn(&PodSpec, &mut PodSpec, &mut Target<'_>) -> RotationResult<RotationMode>;

const COMPARATORS: [Comparator; 4] = [
    scheduler_name,
    affinity,
    tolerations,
    server_image,
];

fn scheduler_name(
    desired: &PodSpec,
    applied: &mut PodSpec,
    _: &mut Target<'_>,
) -> RotationResult<RotationMode> {
    if desired.scheduler_name != applied.scheduler_name {
        applied.scheduler_name = desired.scheduler_name.clone();
        return Ok(RotationMode::Silent);
    }
    Ok(RotationMode::Skipped)
}

fn affinity(
    desired: &PodSpec,
    applied: &mut PodSpec,
    _: &mut Target<'_>,
) -> RotationResult<RotationMode> {
    let want = sha256_json(&desired.affinity)?;
    let have = sha256_json(&applied.affinity)?;
    if want != have {
        applied.affinity = desired.affinity.clone();
        return Ok(RotationMode::Silent);
    }
    Ok(RotationMode::Skipped)
}

fn tolerations(
    desired: &PodSpec,
    applied: &mut PodSpec,
    _: &mut Target<'_>,
) -> RotationResult<RotationMode> {
    if desired.tolerations != applied.tolerations {
        applied.tolerations = desired.tolerations.clone();
        return Ok(RotationMode::Silent);
    }
    Ok(RotationMode::Skipped)
}

fn server_container(spec: &PodSpec) -> RotationResult<&Container> {
    spec.containers
        .iter()
        .find(|c| c.name == SERVER_CONTAINER_NAME)
        .ok_or_else(|| RotationError::MissingContainer(SERVER_CONTAINER_NAME.to_string()))
}

/// An image-only change of the server container can be patched in place.
fn server_image(
    desired: &PodSpec,
    applied: &mut PodSpec,
    target: &mut Target<'_>,
) -> RotationResult<RotationMode> {
    let want = server_container(desired)?.image.clone();
    if server_container(applied)?.image == want {
        return Ok(RotationMode::Skipped);
    }
    let Some(image) = want else {
        return Ok(RotationMode::Skipped);
    };
    if let Some(c) = applied
        .containers
        .iter_mut()
        .find(|c| c.name == SERVER_CONTAINER_NAME)
    {
        c.image = Some(image.clone());
    }
    target.plan.push(
        Action::new(
            ActionType::RuntimeContainerImageUpdate,
            target.group,
            target.member.id.clone(),
        )
        .with_reason("Image changed")
        .with_param(PARAM_IMAGE, image),
    );
    Ok(RotationMode::InPlace)
}

/// Run every comparator over a copy of `applied`.
///
/// Differences no comparator can reconcile leave the copy's checksum
/// apart from `desired` and escalate to `Graceful`.
pub fn compare(
    member: &MemberStatus,
    group: ServerGroup,
    desired: &MemberPodTemplate,
    applied: &MemberPodTemplate,
) -> RotationResult<(RotationMode, Plan)> {
    if desired.checksum == applied.checksum {
        return Ok((RotationMode::Skipped, Plan::new()));
    }

    let mut copy = applied.pod_spec.clone();
    let mut plan = Plan::new();
    let mut mode = RotationMode::Silent;
    {
        let mut target = Target {
            member,
            group,
            plan: &mut plan,
        };
        for cmp in COMPARATORS {
            mode = mode.and(cmp(&desired.pod_spec, &mut copy, &mut target)?);
        }
    }

    let reached = pod_spec_checksum(&copy)?;
    if reached != desired.checksum {
        debug!(
            member = %member.id,
            %group,
            desired = %desired.checksum,
            %reached,
            "pod spec differs beyond what comparators handle, rotating gracefully"
        );
        return Ok((RotationMode::Graceful, Plan::new()));
    }
    Ok((mode, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Affinity, Toleration};
    use std::collections::BTreeMap;

    fn template(spec: PodSpec) -> MemberPodTemplate {
        MemberPodTemplate::new(spec, BTreeMap::new(), BTreeMap::new()).unwrap()
    }

    fn base() -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: SERVER_CONTAINER_NAME.to_string(),
                image: Some("db:1".to_string()),
                args: Some(vec!["--a".to_string()]),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn run(desired: PodSpec, applied: PodSpec) -> (RotationMode, Plan) {
        compare(
            &MemberStatus::new("PRMR-1"),
            ServerGroup::DBServers,
            &template(desired),
            &template(applied),
        )
        .unwrap()
    }

    #[test]
    fn identical_is_skipped() {
        let (mode, plan) = run(base(), base());
        assert_eq!(mode, RotationMode::Skipped);
        assert!(plan.is_empty());
    }

    #[test]
    fn scheduler_name_is_silent() {
        let mut desired = base();
        desired.scheduler_name = Some("custom".to_string());
        assert_eq!(run(desired, base()).0, RotationMode::Silent);
    }

    #[test]
    fn affinity_and_tolerations_are_silent() {
        let mut desired = base();
        desired.affinity = Some(Affinity::default());
        desired.tolerations = Some(vec![Toleration {
            key: Some("k".to_string()),
            ..Default::default()
        }]);
        assert_eq!(run(desired, base()).0, RotationMode::Silent);
    }

    #[test]
    fn image_change_is_in_place_with_action() {
        let mut desired = base();
        desired.containers[0].image = Some("db:2".to_string());
        let (mode, plan) = run(desired, base());
        assert_eq!(mode, RotationMode::InPlace);
        let action = plan.first().unwrap();
        assert_eq!(action.type_, ActionType::RuntimeContainerImageUpdate);
        assert_eq!(action.param(PARAM_IMAGE), Some("db:2"));
    }

    #[test]
    fn uncovered_field_is_graceful() {
        let mut desired = base();
        desired.containers[0].args = Some(vec!["--b".to_string()]);
        desired.scheduler_name = Some("custom".to_string());
        let (mode, plan) = run(desired, base());
        assert_eq!(mode, RotationMode::Graceful);
        assert!(plan.is_empty());
    }

    #[test]
    fn missing_container_is_an_error() {
        let mut applied = base();
        applied.containers[0].name = "other".to_string();
        let mut desired = base();
        desired.containers[0].image = Some("db:2".to_string());
        let err = compare(
            &MemberStatus::new("PRMR-1"),
            ServerGroup::DBServers,
            &template(desired),
            &template(applied),
        )
        .unwrap_err();
        assert!(matches!(err, RotationError::MissingContainer(_)));
    }
}
