//! tessera-kube — Kubernetes bindings for the reconciliation core.
//!
//! ```text
//! DatabaseDeployment (custom resource)
//!   ├── KubeStatusStore   spec/status, CAS on resourceVersion
//!   ├── KubePods          pods, claims, encryption secrets
//!   └── KubeEvents        core/v1 events via kube-runtime
//! ```

pub mod crd;
pub mod error;
pub mod events;
pub mod finalizers;
pub mod pods;
pub mod store;

pub use crd::{DatabaseDeployment, DatabaseDeploymentSpec};
pub use error::{KubeStoreError, KubeStoreResult};
pub use events::KubeEvents;
pub use finalizers::ApiFinalizerClient;
pub use pods::KubePods;
pub use store::KubeStatusStore;
