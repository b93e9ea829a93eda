//! Pod creator for one member role.
//!
//! Database roles (single, agent, dbserver, coordinator) and sync roles
//! (syncmaster, syncworker) differ in ports, volumes and command line but
//! share one capability set. The variant is chosen from the server group
//! once per member.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EmptyDirVolumeSource, PersistentVolumeClaimVolumeSource,
    PodSpec, SecretVolumeSource, Volume, VolumeMount,
};

use tessera_state::{AntiAffinityMode, DeploymentSpec, Environment, MemberStatus, ServerGroup};

use crate::affinity;
use crate::constants::*;
use crate::error::{PodError, PodResult};
use crate::tolerations::{default_tolerations, merge_tolerations};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodCreator {
    Database { group: ServerGroup },
    Sync { group: ServerGroup },
}

impl PodCreator {
    pub fn for_group(group: ServerGroup) -> Self {
        if group.is_sync() {
            PodCreator::Sync { group }
        } else {
            PodCreator::Database { group }
        }
    }

    pub fn group(&self) -> ServerGroup {
        match *self {
            PodCreator::Database { group } | PodCreator::Sync { group } => group,
        }
    }

    pub fn port(&self) -> i32 {
        match self.group() {
            ServerGroup::SyncMasters => SYNC_MASTER_PORT,
            ServerGroup::SyncWorkers => SYNC_WORKER_PORT,
            _ => DATABASE_PORT,
        }
    }

    pub fn validate(&self, spec: &DeploymentSpec) -> PodResult<()> {
        match self {
            PodCreator::Sync { group } if !spec.enterprise => {
                Err(PodError::EnterpriseRequired(*group))
            }
            _ => Ok(()),
        }
    }

    pub fn annotations(&self, member: &MemberStatus) -> BTreeMap<String, String> {
        BTreeMap::from([(ANNOTATION_MEMBER_ID.to_string(), member.id.clone())])
    }

    pub fn labels(&self, deployment: &str) -> BTreeMap<String, String> {
        affinity::member_selector(deployment, self.group())
    }

    /// Volumes and the matching mounts of the server container.
    pub fn volumes(&self, spec: &DeploymentSpec, member: &MemberStatus) -> (Vec<Volume>, Vec<VolumeMount>) {
        let mut volumes = Vec::new();
        let mut mounts = Vec::new();

        let data = match (self, &member.persistent_volume_claim_name) {
            (PodCreator::Database { .. }, Some(claim)) => Volume {
                name: DATA_VOLUME_NAME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim.clone(),
                    read_only: None,
                }),
                ..Default::default()
            },
            _ => Volume {
                name: DATA_VOLUME_NAME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
        };
        volumes.push(data);
        mounts.push(VolumeMount {
            name: DATA_VOLUME_NAME.to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        });

        if let (PodCreator::Database { .. }, Some(secret)) = (self, &spec.encryption_key_secret) {
            volumes.push(Volume {
                name: ENCRYPTION_VOLUME_NAME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            });
            mounts.push(VolumeMount {
                name: ENCRYPTION_VOLUME_NAME.to_string(),
                mount_path: ENCRYPTION_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            });
        }

        (volumes, mounts)
    }

    fn args(&self, spec: &DeploymentSpec, member: &MemberStatus) -> Vec<String> {
        let port = self.port();
        match self {
            PodCreator::Database { group } => {
                let mut args = vec![
                    format!("--server.endpoint=tcp://[::]:{port}"),
                    format!("--database.directory={DATA_MOUNT_PATH}"),
                    format!("--cluster.my-role={}", group.role()),
                    format!("--cluster.my-id={}", member.id),
                ];
                if spec.encryption_key_secret.is_some() {
                    args.push(format!("--rocksdb.encryption-keyfolder={ENCRYPTION_MOUNT_PATH}"));
                }
                args
            }
            PodCreator::Sync { group } => vec![
                match group {
                    ServerGroup::SyncMasters => "run".to_string(),
                    _ => "run-worker".to_string(),
                },
                format!("--server.port={port}"),
                format!("--server.id={}", member.id),
            ],
        }
    }

    pub fn container(&self, spec: &DeploymentSpec, member: &MemberStatus, mounts: Vec<VolumeMount>) -> Container {
        let command = match self {
            PodCreator::Database { .. } => vec!["/usr/sbin/arangod".to_string()],
            PodCreator::Sync { .. } => vec!["/usr/sbin/arangosync".to_string()],
        };
        Container {
            name: SERVER_CONTAINER_NAME.to_string(),
            image: Some(spec.image.clone()),
            command: Some(command),
            args: Some(self.args(spec, member)),
            ports: Some(vec![ContainerPort {
                name: Some("server".to_string()),
                container_port: self.port(),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            volume_mounts: Some(mounts),
            ..Default::default()
        }
    }

    pub fn affinity(&self, spec: &DeploymentSpec, deployment: &str) -> Affinity {
        let group_spec = spec.group(self.group());
        let mode = group_spec.anti_affinity.unwrap_or(match spec.environment {
            Environment::Production => AntiAffinityMode::Required,
            Environment::Development => AntiAffinityMode::Preferred,
        });
        affinity::affinity(deployment, self.group(), mode, group_spec.node_arch.as_deref())
    }

    /// Role specific pod spec settings.
    pub fn apply_pod_spec(&self, pod: &mut PodSpec, spec: &DeploymentSpec) {
        let group_spec = spec.group(self.group());
        pod.scheduler_name = group_spec.scheduler_name.clone();
        pod.tolerations = Some(merge_tolerations(
            default_tolerations(spec.mode, self.group()),
            &group_spec.tolerations,
        ));
        pod.termination_grace_period_seconds = Some(match self {
            PodCreator::Database { group: ServerGroup::DBServers } => 3600,
            PodCreator::Database { .. } => 60,
            PodCreator::Sync { .. } => 30,
        });
    }
}
