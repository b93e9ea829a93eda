//! Error types for the reconciliation core.

use thiserror::Error;

use tessera_core::TimeoutError;
use tessera_pod::PodError;
use tessera_rotation::RotationError;
use tessera_scaling::ScalingError;
use tessera_state::{ActionType, StateError};

pub type ResourceResult<T> = Result<T, ResourceError>;
pub type PlanResult<T> = Result<T, PlanError>;
pub type ActionResult<T> = Result<T, ActionError>;
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Failures of the Kubernetes-facing pod API.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict updating {0}")]
    Conflict(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("{name}: gave up after {attempts} conflicting updates")]
    RetriesExhausted { name: String, attempts: u32 },

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl ResourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResourceError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ResourceError::Conflict(_))
    }
}

/// A plan step could not produce its plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Pod(#[from] PodError),

    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("{0}")]
    Step(String),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{action}: missing parameter {param}")]
    MissingParam {
        action: ActionType,
        param: &'static str,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Pod(#[from] PodError),

    #[error(transparent)]
    Scaling(#[from] ScalingError),
}

/// Failure of a whole reconciliation pass; the loop logs it and retries.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Pod(#[from] PodError),

    #[error(transparent)]
    Action(#[from] ActionError),
}
