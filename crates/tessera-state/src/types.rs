//! Domain types for Tessera deployments.
//!
//! These types are the desired spec and the observed status of one
//! database deployment. They serialize as camelCase JSON, both into the
//! redb value column and into the custom resource, so a persisted plan
//! round-trips across operator restarts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use k8s_openapi::api::core::v1::{PodSpec, Toleration};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StateError, StateResult, ValidationError};

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hex sha256 of the JSON encoding of `value`.
pub fn sha256_json<T: Serialize + ?Sized>(value: &T) -> StateResult<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| StateError::Serialize(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

// ── Server groups ──────────────────────────────────────────────────

/// Role of a member within the database cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ServerGroup {
    Single,
    Agents,
    #[serde(rename = "dbservers")]
    DBServers,
    Coordinators,
    #[serde(rename = "syncmasters")]
    SyncMasters,
    #[serde(rename = "syncworkers")]
    SyncWorkers,
}

impl ServerGroup {
    /// All groups in reconciliation order.
    pub const ALL: [ServerGroup; 6] = [
        ServerGroup::Single,
        ServerGroup::Agents,
        ServerGroup::DBServers,
        ServerGroup::Coordinators,
        ServerGroup::SyncMasters,
        ServerGroup::SyncWorkers,
    ];

    /// Role name used in pod names, labels and DNS.
    pub fn role(self) -> &'static str {
        match self {
            ServerGroup::Single => "single",
            ServerGroup::Agents => "agent",
            ServerGroup::DBServers => "dbserver",
            ServerGroup::Coordinators => "coordinator",
            ServerGroup::SyncMasters => "syncmaster",
            ServerGroup::SyncWorkers => "syncworker",
        }
    }

    pub fn from_role(role: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.role() == role)
    }

    /// Short prefix for generated member ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            ServerGroup::Single => "SNGL",
            ServerGroup::Agents => "AGNT",
            ServerGroup::DBServers => "PRMR",
            ServerGroup::Coordinators => "CRDN",
            ServerGroup::SyncMasters => "SYNM",
            ServerGroup::SyncWorkers => "SYNW",
        }
    }

    pub fn is_sync(self) -> bool {
        matches!(self, ServerGroup::SyncMasters | ServerGroup::SyncWorkers)
    }
}

impl fmt::Display for ServerGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role())
    }
}

// ── Deployment spec ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeploymentMode {
    Single,
    ActiveFailover,
    #[default]
    Cluster,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// When pending-restart conditions force a pod recreation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberPropagationMode {
    /// Restart as soon as a change requires it.
    #[default]
    Always,
    /// Apply on the next natural restart only.
    OnRestart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum AntiAffinityMode {
    Required,
    Preferred,
}

/// Desired configuration of one server group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerGroupSpec {
    pub count: Option<u32>,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
    pub scheduler_name: Option<String>,
    pub tolerations: Vec<Toleration>,
    pub anti_affinity: Option<AntiAffinityMode>,
    /// Node architecture for node affinity (default `amd64`).
    pub node_arch: Option<String>,
}

impl ServerGroupSpec {
    pub fn with_count(count: u32) -> Self {
        Self {
            count: Some(count),
            ..Default::default()
        }
    }

    pub fn with_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_count = Some(min);
        self.max_count = Some(max);
        self
    }

    pub fn min(&self) -> u32 {
        self.min_count.unwrap_or(1)
    }

    pub fn max(&self) -> u32 {
        self.max_count.unwrap_or(u32::MAX)
    }

    /// Check `min ≤ count ≤ max`.
    pub fn validate(&self, group: ServerGroup, count: u32) -> Result<(), ValidationError> {
        let (min, max) = (self.min(), self.max());
        if min > max {
            return Err(ValidationError::InvertedBounds { group, min, max });
        }
        if count < min {
            return Err(ValidationError::BelowMinimum { group, count, min });
        }
        if count > max {
            return Err(ValidationError::AboveMaximum { group, count, max });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SyncSpec {
    pub enabled: bool,
}

/// Desired state of a deployment, supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub mode: DeploymentMode,
    pub environment: Environment,
    pub image: String,
    /// Enterprise license present; required for sync groups.
    pub enterprise: bool,
    pub member_propagation_mode: MemberPropagationMode,
    /// Secret holding the at-rest encryption keys, if encryption is on.
    pub encryption_key_secret: Option<String>,
    pub sync: SyncSpec,
    pub single: ServerGroupSpec,
    pub agents: ServerGroupSpec,
    #[serde(rename = "dbservers")]
    pub dbservers: ServerGroupSpec,
    pub coordinators: ServerGroupSpec,
    #[serde(rename = "syncmasters")]
    pub syncmasters: ServerGroupSpec,
    #[serde(rename = "syncworkers")]
    pub syncworkers: ServerGroupSpec,
}

impl DeploymentSpec {
    pub fn group(&self, group: ServerGroup) -> &ServerGroupSpec {
        match group {
            ServerGroup::Single => &self.single,
            ServerGroup::Agents => &self.agents,
            ServerGroup::DBServers => &self.dbservers,
            ServerGroup::Coordinators => &self.coordinators,
            ServerGroup::SyncMasters => &self.syncmasters,
            ServerGroup::SyncWorkers => &self.syncworkers,
        }
    }

    pub fn group_mut(&mut self, group: ServerGroup) -> &mut ServerGroupSpec {
        match group {
            ServerGroup::Single => &mut self.single,
            ServerGroup::Agents => &mut self.agents,
            ServerGroup::DBServers => &mut self.dbservers,
            ServerGroup::Coordinators => &mut self.coordinators,
            ServerGroup::SyncMasters => &mut self.syncmasters,
            ServerGroup::SyncWorkers => &mut self.syncworkers,
        }
    }

    /// Groups that run members in this mode.
    pub fn active_groups(&self) -> Vec<ServerGroup> {
        let mut groups = match self.mode {
            DeploymentMode::Single => vec![ServerGroup::Single],
            DeploymentMode::ActiveFailover => vec![ServerGroup::Single, ServerGroup::Agents],
            DeploymentMode::Cluster => vec![
                ServerGroup::Agents,
                ServerGroup::DBServers,
                ServerGroup::Coordinators,
            ],
        };
        if self.sync.enabled {
            groups.extend([ServerGroup::SyncMasters, ServerGroup::SyncWorkers]);
        }
        groups
    }

    pub fn is_active(&self, group: ServerGroup) -> bool {
        self.active_groups().contains(&group)
    }

    /// Desired member count of a group, zero for inactive groups.
    pub fn desired_count(&self, group: ServerGroup) -> u32 {
        if !self.is_active(group) {
            return 0;
        }
        let default = match (self.mode, group) {
            (DeploymentMode::ActiveFailover, ServerGroup::Single) => 2,
            (_, ServerGroup::Single) => 1,
            _ => 3,
        };
        self.group(group).count.unwrap_or(default)
    }

    /// Validate bounds of every active group plus global constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.image.trim().is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        for group in self.active_groups() {
            if group.is_sync() && !self.enterprise {
                return Err(ValidationError::EnterpriseRequired { group });
            }
            self.group(group).validate(group, self.desired_count(group))?;
        }
        Ok(())
    }

    pub fn checksum(&self) -> StateResult<String> {
        sha256_json(self)
    }
}

// ── Conditions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    Ready,
    Terminating,
    Terminated,
    PendingRestart,
    #[serde(rename = "PendingTLSRotation")]
    PendingTlsRotation,
    AutoUpgrade,
    ActionFailed,
    ScalingIntegration,
}

/// A named boolean flag with reason and message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_update_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ConditionList(Vec<Condition>);

impl ConditionList {
    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_).is_some_and(|c| c.status)
    }

    /// Set a condition. Returns true if anything changed.
    pub fn update(&mut self, type_: ConditionType, status: bool, reason: &str, message: &str) -> bool {
        let now = epoch_secs();
        match self.0.iter_mut().find(|c| c.type_ == type_) {
            Some(c) if c.status == status && c.reason == reason && c.message == message => false,
            Some(c) => {
                c.status = status;
                c.reason = reason.to_string();
                c.message = message.to_string();
                c.last_update_time = now;
                true
            }
            None => {
                self.0.push(Condition {
                    type_,
                    status,
                    reason: reason.to_string(),
                    message: message.to_string(),
                    last_update_time: now,
                });
                true
            }
        }
    }

    /// Drop a condition. Returns true if it was present.
    pub fn remove(&mut self, type_: ConditionType) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c.type_ != type_);
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Members ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum MemberPhase {
    /// Known to the operator, no pod yet.
    #[default]
    Pending,
    /// Pod created with the recorded template.
    Created,
    /// Container image being replaced in place.
    Upgrading,
    Failed,
    Terminated,
}

/// Rendered pod template of a member together with its checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberPodTemplate {
    pub pod_spec: PodSpec,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub checksum: String,
}

impl MemberPodTemplate {
    pub fn new(
        pod_spec: PodSpec,
        annotations: BTreeMap<String, String>,
        labels: BTreeMap<String, String>,
    ) -> StateResult<Self> {
        let checksum = pod_spec_checksum(&pod_spec)?;
        Ok(Self {
            pod_spec,
            annotations,
            labels,
            checksum,
        })
    }

    /// Recompute the checksum after the pod spec was edited.
    pub fn refresh_checksum(&mut self) -> StateResult<()> {
        self.checksum = pod_spec_checksum(&self.pod_spec)?;
        Ok(())
    }

    pub fn equals(&self, other: &MemberPodTemplate) -> bool {
        self.checksum == other.checksum
    }
}

/// Checksum identifying a pod spec.
pub fn pod_spec_checksum(spec: &PodSpec) -> StateResult<String> {
    sha256_json(spec)
}

/// Observed state of one cluster member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberStatus {
    pub id: String,
    pub phase: MemberPhase,
    pub created_at: u64,
    pub pod_name: Option<String>,
    pub pod_uid: Option<String>,
    /// Checksum of the template the current pod was created from.
    pub pod_spec_version: Option<String>,
    pub persistent_volume_claim_name: Option<String>,
    pub image: Option<String>,
    pub conditions: ConditionList,
    /// Last template applied to this member.
    pub template: Option<MemberPodTemplate>,
}

impl MemberStatus {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: epoch_secs(),
            ..Default::default()
        }
    }

    pub fn has_pod_spec_version(&self) -> bool {
        self.pod_spec_version.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// Forget the current pod; the member goes back to `Pending`.
    pub fn clear_pod(&mut self) {
        self.pod_name = None;
        self.pod_uid = None;
        self.pod_spec_version = None;
        self.phase = MemberPhase::Pending;
        self.conditions.remove(ConditionType::Ready);
        self.conditions.remove(ConditionType::Terminating);
    }
}

/// Members of every group, each list in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DeploymentMembers {
    pub single: Vec<MemberStatus>,
    pub agents: Vec<MemberStatus>,
    #[serde(rename = "dbservers")]
    pub dbservers: Vec<MemberStatus>,
    pub coordinators: Vec<MemberStatus>,
    #[serde(rename = "syncmasters")]
    pub syncmasters: Vec<MemberStatus>,
    #[serde(rename = "syncworkers")]
    pub syncworkers: Vec<MemberStatus>,
}

impl DeploymentMembers {
    pub fn group(&self, group: ServerGroup) -> &[MemberStatus] {
        match group {
            ServerGroup::Single => &self.single,
            ServerGroup::Agents => &self.agents,
            ServerGroup::DBServers => &self.dbservers,
            ServerGroup::Coordinators => &self.coordinators,
            ServerGroup::SyncMasters => &self.syncmasters,
            ServerGroup::SyncWorkers => &self.syncworkers,
        }
    }

    pub fn group_mut(&mut self, group: ServerGroup) -> &mut Vec<MemberStatus> {
        match group {
            ServerGroup::Single => &mut self.single,
            ServerGroup::Agents => &mut self.agents,
            ServerGroup::DBServers => &mut self.dbservers,
            ServerGroup::Coordinators => &mut self.coordinators,
            ServerGroup::SyncMasters => &mut self.syncmasters,
            ServerGroup::SyncWorkers => &mut self.syncworkers,
        }
    }

    /// Every member with its group, in group order.
    pub fn iter(&self) -> impl Iterator<Item = (ServerGroup, &MemberStatus)> {
        ServerGroup::ALL
            .into_iter()
            .flat_map(move |g| self.group(g).iter().map(move |m| (g, m)))
    }

    pub fn find(&self, id: &str) -> Option<(ServerGroup, &MemberStatus)> {
        self.iter().find(|(_, m)| m.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut MemberStatus> {
        let group = self.find(id)?.0;
        self.group_mut(group).iter_mut().find(|m| m.id == id)
    }

    pub fn add(&mut self, group: ServerGroup, member: MemberStatus) {
        self.group_mut(group).push(member);
    }

    pub fn remove(&mut self, id: &str) -> Option<(ServerGroup, MemberStatus)> {
        let group = self.find(id)?.0;
        let list = self.group_mut(group);
        let idx = list.iter().position(|m| m.id == id)?;
        Some((group, list.remove(idx)))
    }

    pub fn count(&self, group: ServerGroup) -> usize {
        self.group(group).len()
    }
}

// ── Plan ───────────────────────────────────────────────────────────

/// Closed set of plan action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ActionType {
    AddMember,
    RemoveMember,
    KillMemberPod,
    RotateMember,
    WaitForMemberUp,
    MemberPodStatusUpdate,
    RuntimeContainerImageUpdate,
    EncryptionKeyStatusUpdate,
    DisableClusterScaling,
    EnableClusterScaling,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        ActionType::AddMember,
        ActionType::RemoveMember,
        ActionType::KillMemberPod,
        ActionType::RotateMember,
        ActionType::WaitForMemberUp,
        ActionType::MemberPodStatusUpdate,
        ActionType::RuntimeContainerImageUpdate,
        ActionType::EncryptionKeyStatusUpdate,
        ActionType::DisableClusterScaling,
        ActionType::EnableClusterScaling,
    ];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

static ACTION_SEQ: AtomicU64 = AtomicU64::new(0);

fn new_action_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let seq = ACTION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{:x}{:04x}", nanos, seq & 0xffff)
}

/// One planned step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: ActionType,
    /// Unset for deployment-wide actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ServerGroup>,
    #[serde(default)]
    pub member_id: String,
    pub created_at: u64,
    #[serde(default)]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Action {
    pub fn new(type_: ActionType, group: ServerGroup, member_id: impl Into<String>) -> Self {
        Self {
            group: Some(group),
            member_id: member_id.into(),
            ..Self::for_deployment(type_)
        }
    }

    /// Action that targets the deployment rather than one member.
    pub fn for_deployment(type_: ActionType) -> Self {
        Self {
            id: new_action_id(),
            type_,
            group: None,
            member_id: String::new(),
            created_at: epoch_secs(),
            start_time: None,
            reason: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_started(&self) -> bool {
        self.start_time.is_some()
    }
}

/// Ordered queue of pending actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Plan(Vec<Action>);

impl Plan {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&Action> {
        self.0.first()
    }

    pub fn first_mut(&mut self) -> Option<&mut Action> {
        self.0.first_mut()
    }

    pub fn push(&mut self, action: Action) {
        self.0.push(action);
    }

    pub fn append(&mut self, mut other: Plan) {
        self.0.append(&mut other.0);
    }

    /// Remove the head action if its id matches.
    pub fn remove_head(&mut self, id: &str) -> Option<Action> {
        if self.0.first().is_some_and(|a| a.id == id) {
            Some(self.0.remove(0))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    pub fn types(&self) -> Vec<ActionType> {
        self.0.iter().map(|a| a.type_).collect()
    }
}

impl From<Vec<Action>> for Plan {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl FromIterator<Action> for Plan {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Plan {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ── Deployment status ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeploymentPhase {
    #[default]
    None,
    Running,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncryptionHashes {
    pub keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DeploymentHashes {
    pub encryption: EncryptionHashes,
}

/// Observed state of a deployment; owned by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub phase: DeploymentPhase,
    pub members: DeploymentMembers,
    pub plan: Plan,
    pub hashes: DeploymentHashes,
    pub conditions: ConditionList,
    /// Checksum of the last spec that passed validation.
    pub accepted_spec_checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_spec() -> DeploymentSpec {
        DeploymentSpec {
            image: "arangodb/arangodb:3.11".to_string(),
            coordinators: ServerGroupSpec::with_count(3).with_bounds(2, 5),
            ..Default::default()
        }
    }

    #[test]
    fn group_roles_roundtrip() {
        for g in ServerGroup::ALL {
            assert_eq!(ServerGroup::from_role(g.role()), Some(g));
        }
        assert_eq!(ServerGroup::DBServers.to_string(), "dbserver");
    }

    #[test]
    fn active_groups_by_mode() {
        let mut spec = cluster_spec();
        assert_eq!(
            spec.active_groups(),
            vec![ServerGroup::Agents, ServerGroup::DBServers, ServerGroup::Coordinators]
        );
        spec.mode = DeploymentMode::Single;
        assert_eq!(spec.active_groups(), vec![ServerGroup::Single]);
        assert_eq!(spec.desired_count(ServerGroup::Coordinators), 0);
    }

    #[test]
    fn validate_bounds() {
        let mut spec = cluster_spec();
        assert!(spec.validate().is_ok());

        spec.coordinators.count = Some(6);
        assert_eq!(
            spec.validate(),
            Err(ValidationError::AboveMaximum {
                group: ServerGroup::Coordinators,
                count: 6,
                max: 5
            })
        );

        spec.coordinators.count = Some(1);
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::BelowMinimum { .. })
        ));
    }

    #[test]
    fn sync_needs_enterprise() {
        let mut spec = cluster_spec();
        spec.sync.enabled = true;
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::EnterpriseRequired { .. })
        ));
        spec.enterprise = true;
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn condition_update_reports_changes() {
        let mut conditions = ConditionList::default();
        assert!(conditions.update(ConditionType::Ready, true, "PodReady", ""));
        assert!(!conditions.update(ConditionType::Ready, true, "PodReady", ""));
        assert!(conditions.is_true(ConditionType::Ready));
        assert!(conditions.update(ConditionType::Ready, false, "PodNotReady", ""));
        assert!(!conditions.is_true(ConditionType::Ready));
        assert!(conditions.remove(ConditionType::Ready));
        assert!(!conditions.remove(ConditionType::Ready));
    }

    #[test]
    fn members_find_and_remove() {
        let mut members = DeploymentMembers::default();
        members.add(ServerGroup::Coordinators, MemberStatus::new("CRDN-1"));
        members.add(ServerGroup::DBServers, MemberStatus::new("PRMR-1"));

        let (group, m) = members.find("PRMR-1").unwrap();
        assert_eq!(group, ServerGroup::DBServers);
        assert_eq!(m.id, "PRMR-1");

        members.find_mut("CRDN-1").unwrap().phase = MemberPhase::Created;
        let (group, removed) = members.remove("CRDN-1").unwrap();
        assert_eq!(group, ServerGroup::Coordinators);
        assert_eq!(removed.phase, MemberPhase::Created);
        assert!(members.find("CRDN-1").is_none());
    }

    #[test]
    fn plan_remove_head_only_matches_first() {
        let a = Action::new(ActionType::AddMember, ServerGroup::Agents, "");
        let b = Action::new(ActionType::WaitForMemberUp, ServerGroup::Agents, "x");
        let mut plan = Plan::from(vec![a.clone(), b.clone()]);
        assert!(plan.remove_head(&b.id).is_none());
        assert_eq!(plan.remove_head(&a.id).unwrap().id, a.id);
        assert_eq!(plan.types(), vec![ActionType::WaitForMemberUp]);
    }

    #[test]
    fn action_ids_are_unique() {
        let a = Action::new(ActionType::AddMember, ServerGroup::Agents, "");
        let b = Action::new(ActionType::AddMember, ServerGroup::Agents, "");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn status_json_shape() {
        let mut status = DeploymentStatus::default();
        status.plan.push(
            Action::new(ActionType::MemberPodStatusUpdate, ServerGroup::DBServers, "PRMR-1")
                .with_param("checksum", "abc"),
        );
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["plan"][0]["type"], "MemberPodStatusUpdate");
        assert_eq!(json["plan"][0]["group"], "dbservers");
        assert_eq!(json["plan"][0]["memberId"], "PRMR-1");
        assert_eq!(json["plan"][0]["params"]["checksum"], "abc");

        let back: DeploymentStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn template_checksum_tracks_spec() {
        let mut template = MemberPodTemplate::new(
            PodSpec::default(),
            BTreeMap::new(),
            BTreeMap::new(),
        )
        .unwrap();
        let before = template.checksum.clone();
        template.pod_spec.scheduler_name = Some("custom".to_string());
        template.refresh_checksum().unwrap();
        assert_ne!(before, template.checksum);
    }
}
