//! tesserad — the Tessera operator daemon.
//!
//! ```text
//! Operator ── discovery every N s ──▶ DeploymentSource (custom resources
//!                                                    or a local state file)
//!   └── DeploymentLoop per deployment
//!         ├── reconcile task   (tessera-reconcile)
//!         └── scaling task     (tessera-scaling)
//! admin API (axum) ── reads ──▶ StatusStore
//! ```

pub mod api;
pub mod cluster;
pub mod deployment;
pub mod local;
pub mod operator;
pub mod validate;

pub use api::build_router;
pub use cluster::KubeSource;
pub use deployment::{DeploymentLoop, PLAN_TICK};
pub use operator::{DeploymentSource, Operator};
