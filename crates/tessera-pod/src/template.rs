//! Member pod template rendering.

use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use tessera_core::{Feature, FeatureSet};
use tessera_state::{DeploymentSpec, MemberPodTemplate, MemberStatus, ServerGroup};

use crate::constants::{ANNOTATION_POD_SPEC_VERSION, FINALIZER_GRACEFUL_SHUTDOWN};
use crate::creator::PodCreator;
use crate::error::PodResult;
use crate::names;

/// Deployment-wide inputs to rendering.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub deployment: String,
    pub namespace: String,
    pub cluster_domain: Option<String>,
    pub features: FeatureSet,
}

impl RenderContext {
    pub fn new(deployment: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            namespace: namespace.into(),
            cluster_domain: None,
            features: FeatureSet::default(),
        }
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }
}

/// Render the desired pod template of `member`.
pub fn render_member_template(
    ctx: &RenderContext,
    spec: &DeploymentSpec,
    group: ServerGroup,
    member: &MemberStatus,
) -> PodResult<MemberPodTemplate> {
    let creator = PodCreator::for_group(group);
    creator.validate(spec)?;

    let (volumes, mounts) = creator.volumes(spec, member);
    let mut pod_spec = PodSpec {
        containers: vec![creator.container(spec, member, mounts)],
        volumes: Some(volumes),
        affinity: Some(creator.affinity(spec, &ctx.deployment)),
        hostname: Some(names::pod_host_name(&ctx.deployment, group, &member.id)),
        subdomain: Some(names::headless_service_name(&ctx.deployment)),
        ..Default::default()
    };
    creator.apply_pod_spec(&mut pod_spec, spec);

    Ok(MemberPodTemplate::new(
        pod_spec,
        creator.annotations(member),
        creator.labels(&ctx.deployment),
    )?)
}

/// Finalizers put on every member pod.
pub fn pod_finalizers(features: &FeatureSet) -> Vec<String> {
    if features.enabled(Feature::GracefulShutdown) {
        vec![FINALIZER_GRACEFUL_SHUTDOWN.to_string()]
    } else {
        Vec::new()
    }
}

/// Build the pod object for `member` from a rendered template.
pub fn build_pod(
    ctx: &RenderContext,
    template: &MemberPodTemplate,
    group: ServerGroup,
    member: &MemberStatus,
) -> PodResult<Pod> {
    let name = names::pod_name(
        &ctx.deployment,
        group,
        &member.id,
        &template.pod_spec,
        &ctx.features,
    )?;
    let finalizers = pod_finalizers(&ctx.features);
    let mut annotations = template.annotations.clone();
    annotations.insert(
        ANNOTATION_POD_SPEC_VERSION.to_string(),
        template.checksum.clone(),
    );
    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(ctx.namespace.clone()),
            labels: Some(template.labels.clone()),
            annotations: Some(annotations),
            finalizers: (!finalizers.is_empty()).then_some(finalizers),
            ..Default::default()
        },
        spec: Some(template.pod_spec.clone()),
        status: None,
    })
}

/// Checksum of the template `pod` was built from, if it carries one.
pub fn pod_spec_version(pod: &Pod) -> Option<&str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_POD_SPEC_VERSION))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    fn spec() -> DeploymentSpec {
        DeploymentSpec {
            image: "arangodb/arangodb:3.11".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let ctx = RenderContext::new("db", "default");
        let member = MemberStatus::new("PRMR-1");
        let a = render_member_template(&ctx, &spec(), ServerGroup::DBServers, &member).unwrap();
        let b = render_member_template(&ctx, &spec(), ServerGroup::DBServers, &member).unwrap();
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.labels[LABEL_ROLE], "dbserver");
        assert_eq!(a.annotations[ANNOTATION_MEMBER_ID], "PRMR-1");
        assert_eq!(a.pod_spec.subdomain.as_deref(), Some("db-int"));
    }

    #[test]
    fn image_change_changes_checksum() {
        let ctx = RenderContext::new("db", "default");
        let member = MemberStatus::new("CRDN-1");
        let a = render_member_template(&ctx, &spec(), ServerGroup::Coordinators, &member).unwrap();
        let newer = DeploymentSpec {
            image: "arangodb/arangodb:3.12".to_string(),
            ..spec()
        };
        let b = render_member_template(&ctx, &newer, ServerGroup::Coordinators, &member).unwrap();
        assert_ne!(a.checksum, b.checksum);
    }

    #[test]
    fn sync_without_license_fails() {
        let ctx = RenderContext::new("db", "default");
        let member = MemberStatus::new("SYNM-1");
        assert!(render_member_template(&ctx, &spec(), ServerGroup::SyncMasters, &member).is_err());
    }

    #[test]
    fn pod_carries_graceful_finalizer_by_default() {
        let ctx = RenderContext::new("db", "ns1");
        let member = MemberStatus::new("AGNT-1");
        let template = render_member_template(&ctx, &spec(), ServerGroup::Agents, &member).unwrap();
        let pod = build_pod(&ctx, &template, ServerGroup::Agents, &member).unwrap();
        assert_eq!(pod.metadata.namespace.as_deref(), Some("ns1"));
        assert!(pod.metadata.name.as_ref().unwrap().starts_with("db-agent-agnt-1-"));
        assert_eq!(
            pod.metadata.finalizers,
            Some(vec![FINALIZER_GRACEFUL_SHUTDOWN.to_string()])
        );
        assert_eq!(pod_spec_version(&pod), Some(template.checksum.as_str()));

        let ctx = ctx.with_features(FeatureSet::default().with(Feature::GracefulShutdown, false));
        let pod = build_pod(&ctx, &template, ServerGroup::Agents, &member).unwrap();
        assert!(pod.metadata.finalizers.is_none());
    }
}
