//! tessera-state — deployment data model and versioned status store.
//!
//! # Architecture
//!
//! ```text
//! DeploymentSpec   (desired, user supplied)
//! DeploymentStatus (observed, reconciler owned)
//!   ├── DeploymentMembers → MemberStatus per group
//!   ├── Plan → Action queue
//!   └── hashes, conditions
//!
//! StatusStore (trait, compare-and-swap on an opaque version)
//!   ├── StateStore (redb, on-disk or in-memory)
//!   └── custom resource store (tessera-kube)
//! ```
//!
//! All domain types are JSON-serialized (camelCase). The `StateStore` is
//! `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and can be shared
//! across async tasks.

pub mod error;
pub mod events;
pub mod status;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult, ValidationError};
pub use events::{DeploymentEvent, EventKind, EventRecorder, LogEvents, MemoryEvents};
pub use status::{
    MAX_CONFLICT_RETRIES, StatusStore, TimedStore, Versioned, with_spec_update, with_status_update,
};
pub use store::StateStore;
pub use types::*;
