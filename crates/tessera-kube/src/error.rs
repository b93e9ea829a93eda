//! Error types for the Kubernetes bindings.

use thiserror::Error;

use tessera_core::TimeoutError;
use tessera_reconcile::ResourceError;
use tessera_state::StateError;

pub type KubeStoreResult<T> = Result<T, KubeStoreError>;

#[derive(Debug, Error)]
pub enum KubeStoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// 409 from the API server: the object moved past the given version.
    #[error("conflict on {0}")]
    Conflict(String),

    #[error("kubernetes api: {0}")]
    Api(#[from] kube::Error),

    #[error("serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl KubeStoreError {
    /// Classify an API error for the object `name`.
    pub fn from_api(name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => KubeStoreError::NotFound(name.to_string()),
            kube::Error::Api(resp) if resp.code == 409 => KubeStoreError::Conflict(name.to_string()),
            _ => KubeStoreError::Api(err),
        }
    }
}

impl From<KubeStoreError> for StateError {
    fn from(err: KubeStoreError) -> Self {
        match err {
            KubeStoreError::NotFound(name) => StateError::NotFound(name),
            KubeStoreError::Conflict(name) => StateError::Conflict(name),
            KubeStoreError::Serialize(e) => StateError::Serialize(e.to_string()),
            KubeStoreError::Timeout(e) => StateError::Timeout(e),
            other => StateError::Remote(other.to_string()),
        }
    }
}

impl From<KubeStoreError> for ResourceError {
    fn from(err: KubeStoreError) -> Self {
        match err {
            KubeStoreError::NotFound(name) => ResourceError::NotFound(name),
            KubeStoreError::Conflict(name) => ResourceError::Conflict(name),
            KubeStoreError::Timeout(e) => ResourceError::Timeout(e),
            other => ResourceError::Api(other.to_string()),
        }
    }
}
