//! Pod anti-affinity and node affinity for members.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    PodAffinityTerm, PodAntiAffinity, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use tessera_state::{AntiAffinityMode, ServerGroup};

use crate::constants::*;

/// Labels identifying the members of one group of a deployment.
pub fn member_selector(deployment: &str, group: ServerGroup) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), LABEL_APP_VALUE.to_string()),
        (LABEL_DEPLOYMENT.to_string(), deployment.to_string()),
        (LABEL_ROLE.to_string(), group.role().to_string()),
    ])
}

/// Keep members of the same group off the same host.
pub fn pod_anti_affinity(
    deployment: &str,
    group: ServerGroup,
    mode: AntiAffinityMode,
) -> PodAntiAffinity {
    let term = PodAffinityTerm {
        label_selector: Some(LabelSelector {
            match_labels: Some(member_selector(deployment, group)),
            ..Default::default()
        }),
        topology_key: TOPOLOGY_KEY_HOSTNAME.to_string(),
        ..Default::default()
    };
    match mode {
        AntiAffinityMode::Required => PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![term]),
            ..Default::default()
        },
        AntiAffinityMode::Preferred => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    pod_affinity_term: term,
                    weight: 100,
                },
            ]),
            ..Default::default()
        },
    }
}

/// Require nodes of the given architecture.
pub fn node_arch_affinity(arch: &str) -> NodeAffinity {
    NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: NODE_ARCH_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![arch.to_string()]),
                }]),
                ..Default::default()
            }],
        }),
        ..Default::default()
    }
}

pub fn affinity(
    deployment: &str,
    group: ServerGroup,
    mode: AntiAffinityMode,
    arch: Option<&str>,
) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(pod_anti_affinity(deployment, group, mode)),
        node_affinity: Some(node_arch_affinity(arch.unwrap_or(DEFAULT_NODE_ARCH))),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_anti_affinity_selects_group() {
        let anti = pod_anti_affinity("db", ServerGroup::Agents, AntiAffinityMode::Required);
        let terms = anti.required_during_scheduling_ignored_during_execution.unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].topology_key, TOPOLOGY_KEY_HOSTNAME);
        let labels = terms[0]
            .label_selector
            .as_ref()
            .and_then(|s| s.match_labels.clone())
            .unwrap();
        assert_eq!(labels[LABEL_ROLE], "agent");
        assert_eq!(labels[LABEL_DEPLOYMENT], "db");
        assert!(anti.preferred_during_scheduling_ignored_during_execution.is_none());
    }

    #[test]
    fn preferred_anti_affinity_is_weighted() {
        let anti = pod_anti_affinity("db", ServerGroup::DBServers, AntiAffinityMode::Preferred);
        let terms = anti.preferred_during_scheduling_ignored_during_execution.unwrap();
        assert_eq!(terms[0].weight, 100);
        assert!(anti.required_during_scheduling_ignored_during_execution.is_none());
    }

    #[test]
    fn node_affinity_defaults_to_amd64() {
        let a = affinity("db", ServerGroup::Coordinators, AntiAffinityMode::Required, None);
        let selector = a
            .node_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap();
        let req = &selector.node_selector_terms[0].match_expressions.as_ref().unwrap()[0];
        assert_eq!(req.key, NODE_ARCH_LABEL);
        assert_eq!(req.operator, "In");
        assert_eq!(req.values.as_deref(), Some(&["amd64".to_string()][..]));
    }
}
