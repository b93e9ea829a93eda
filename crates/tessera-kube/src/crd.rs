//! The `DatabaseDeployment` custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use tessera_state::{DeploymentSpec, DeploymentStatus};

pub const GROUP: &str = "tessera.io";
pub const VERSION: &str = "v1";

/// Desired state of a database deployment.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "tessera.io",
    version = "v1",
    kind = "DatabaseDeployment",
    plural = "databasedeployments",
    shortname = "tdb",
    namespaced,
    status = "DeploymentStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
pub struct DatabaseDeploymentSpec {
    #[serde(flatten)]
    pub deployment: DeploymentSpec,
}

impl DatabaseDeployment {
    pub fn deployment_spec(&self) -> &DeploymentSpec {
        &self.spec.deployment
    }
}
