//! tessera-reconcile — the reconciliation core of one deployment.
//!
//! # Architecture
//!
//! ```text
//! reconcile_once (pass)
//!   ├── resources::inspect_resources   member pods ⇄ status
//!   ├── builder::build_plan            PlanAppender chain, pure
//!   │     └── tessera_rotation         rotation decision per member
//!   └── executor::execute_plan         one action in flight
//!         └── registry → actions::*    start / check_progress / timeout
//! ```
//!
//! Plans are persisted in the deployment status before they run, so a
//! restarted operator resumes from the stored head action. All status
//! writes go through compare-and-swap.

pub mod action;
pub mod actions;
pub mod appender;
pub mod builder;
pub mod context;
pub mod error;
pub mod executor;
pub mod finalizers;
pub mod pass;
pub mod registry;
pub mod resources;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{Action, DEFAULT_TIMEOUT, Progress};
pub use appender::PlanAppender;
pub use builder::{PlanContext, build_plan};
pub use context::{ClusterSnapshot, DeploymentContext, PodInterface};
pub use error::{
    ActionError, ActionResult, PlanError, PlanResult, ReconcileError, ReconcileResult,
    ResourceError, ResourceResult,
};
pub use executor::{REASON_ACTION_TIMEOUT, execute_plan};
pub use finalizers::{FinalizerClient, FinalizerState, remove_finalizers};
pub use pass::{PassOutcome, REASON_SPEC_INVALID, reconcile_once};
pub use registry::create_action;
