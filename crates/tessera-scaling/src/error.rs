//! Error types for the scaling integration.

use thiserror::Error;

use tessera_core::TimeoutError;
use tessera_state::StateError;

pub type AdminResult<T> = Result<T, AdminError>;
pub type ScalingResult<T> = Result<T, ScalingError>;

/// Failures talking to the database admin endpoint.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("http: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

#[derive(Debug, Error)]
pub enum ScalingError {
    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    State(#[from] StateError),
}
