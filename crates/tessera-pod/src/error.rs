//! Error types for pod construction.

use thiserror::Error;

use tessera_state::{ServerGroup, StateError};

pub type PodResult<T> = Result<T, PodError>;

#[derive(Debug, Error)]
pub enum PodError {
    #[error("invalid resource name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("{0} requires an enterprise license")]
    EnterpriseRequired(ServerGroup),

    #[error("name pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("checksum: {0}")]
    Checksum(#[from] StateError),
}
