//! Error types for the Tessera status store.

use thiserror::Error;

use tessera_core::TimeoutError;

use crate::types::ServerGroup;

/// Result type alias for status store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during status store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The stored version moved since it was read.
    #[error("version conflict on {0}")]
    Conflict(String),

    #[error("{name}: gave up after {attempts} conflicting writes")]
    RetriesExhausted { name: String, attempts: u32 },

    /// Transport or API failure of a remote store.
    #[error("remote store error: {0}")]
    Remote(String),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl StateError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StateError::Timeout(_))
    }
}

/// A deployment spec that violates its own bounds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{group}: count {count} is below minimum {min}")]
    BelowMinimum { group: ServerGroup, count: u32, min: u32 },

    #[error("{group}: count {count} is above maximum {max}")]
    AboveMaximum { group: ServerGroup, count: u32, max: u32 },

    #[error("{group}: minimum {min} is above maximum {max}")]
    InvertedBounds { group: ServerGroup, min: u32, max: u32 },

    #[error("image must not be empty")]
    EmptyImage,

    #[error("{group} requires an enterprise license")]
    EnterpriseRequired { group: ServerGroup },
}
