//! Default tolerations per server group.
//!
//! Members tolerate `not-ready` / `unreachable` nodes for a group specific
//! time before Kubernetes evicts them. Agents and single servers hold on
//! forever since losing them is more expensive than waiting.

use k8s_openapi::api::core::v1::Toleration;

use tessera_state::{DeploymentMode, ServerGroup};

pub const TOLERATION_NODE_NOT_READY: &str = "node.kubernetes.io/not-ready";
pub const TOLERATION_NODE_UNREACHABLE: &str = "node.kubernetes.io/unreachable";
pub const TOLERATION_NODE_ALPHA_UNREACHABLE: &str = "node.alpha.kubernetes.io/unreachable";

const EFFECT_NO_EXECUTE: &str = "NoExecute";

/// Seconds a member of `group` tolerates a failed node; `None` is forever.
pub fn toleration_seconds(mode: DeploymentMode, group: ServerGroup) -> Option<i64> {
    match group {
        ServerGroup::Agents => None,
        ServerGroup::Coordinators => Some(15),
        ServerGroup::DBServers => Some(300),
        ServerGroup::SyncMasters => Some(15),
        ServerGroup::SyncWorkers => Some(60),
        ServerGroup::Single if mode == DeploymentMode::Single => None,
        ServerGroup::Single => Some(300),
    }
}

fn no_execute(key: &str, seconds: Option<i64>) -> Toleration {
    Toleration {
        key: Some(key.to_string()),
        operator: Some("Exists".to_string()),
        effect: Some(EFFECT_NO_EXECUTE.to_string()),
        toleration_seconds: seconds,
        ..Default::default()
    }
}

pub fn default_tolerations(mode: DeploymentMode, group: ServerGroup) -> Vec<Toleration> {
    let seconds = toleration_seconds(mode, group);
    vec![
        no_execute(TOLERATION_NODE_NOT_READY, seconds),
        no_execute(TOLERATION_NODE_UNREACHABLE, seconds),
        no_execute(TOLERATION_NODE_ALPHA_UNREACHABLE, seconds),
    ]
}

/// User tolerations replace defaults with the same key and effect.
pub fn merge_tolerations(defaults: Vec<Toleration>, user: &[Toleration]) -> Vec<Toleration> {
    let mut merged: Vec<Toleration> = defaults
        .into_iter()
        .filter(|d| !user.iter().any(|u| u.key == d.key && u.effect == d.effect))
        .collect();
    merged.extend(user.iter().cloned());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_per_group() {
        let cluster = DeploymentMode::Cluster;
        assert_eq!(toleration_seconds(cluster, ServerGroup::Agents), None);
        assert_eq!(toleration_seconds(cluster, ServerGroup::Coordinators), Some(15));
        assert_eq!(toleration_seconds(cluster, ServerGroup::DBServers), Some(300));
        assert_eq!(toleration_seconds(cluster, ServerGroup::SyncMasters), Some(15));
        assert_eq!(toleration_seconds(cluster, ServerGroup::SyncWorkers), Some(60));
        assert_eq!(toleration_seconds(DeploymentMode::Single, ServerGroup::Single), None);
        assert_eq!(
            toleration_seconds(DeploymentMode::ActiveFailover, ServerGroup::Single),
            Some(300)
        );
    }

    #[test]
    fn user_toleration_overrides_default() {
        let user = vec![no_execute(TOLERATION_NODE_NOT_READY, Some(1))];
        let merged = merge_tolerations(
            default_tolerations(DeploymentMode::Cluster, ServerGroup::DBServers),
            &user,
        );
        assert_eq!(merged.len(), 3);
        let not_ready: Vec<_> = merged
            .iter()
            .filter(|t| t.key.as_deref() == Some(TOLERATION_NODE_NOT_READY))
            .collect();
        assert_eq!(not_ready.len(), 1);
        assert_eq!(not_ready[0].toleration_seconds, Some(1));
    }
}
