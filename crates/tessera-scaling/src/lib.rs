//! tessera-scaling — cluster scaling integration.
//!
//! The database lets users change the number of coordinators and DB
//! servers from its own web UI. This crate keeps those counts and the
//! deployment spec in agreement without the two sides fighting:
//!
//! - [`admin`]: the `numberOfServers` admin endpoint (HTTP and in-memory)
//! - [`integration`]: the per-deployment sync loop

pub mod admin;
pub mod error;
pub mod integration;

pub use admin::{ClusterAdmin, HttpClusterAdmin, MemoryAdmin, NumberOfServers};
pub use error::{AdminError, AdminResult, ScalingError, ScalingResult};
pub use integration::{BOOTSTRAP_GRACE, REASON_VALIDATION_FAILED, ScalingIntegration, TICK};
