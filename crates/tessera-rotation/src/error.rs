//! Error types for rotation decisions.

use thiserror::Error;

use tessera_state::StateError;

pub type RotationResult<T> = Result<T, RotationError>;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("container {0:?} missing from pod template")]
    MissingContainer(String),

    #[error("checksum: {0}")]
    Checksum(#[from] StateError),
}
