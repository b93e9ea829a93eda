//! Versioned status store boundary.
//!
//! A store holds, per deployment, the desired spec and the observed
//! status under one opaque version. Writes are compare-and-swap against a
//! version read earlier; a moved version is a [`StateError::Conflict`]
//! and the caller re-reads and retries. [`TimedStore`] puts every call of
//! a store under a deadline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use tessera_core::Timeout;

use crate::error::{StateError, StateResult};
use crate::types::{DeploymentSpec, DeploymentStatus};

/// Upper bound on re-read/retry cycles after write conflicts.
pub const MAX_CONFLICT_RETRIES: u32 = 50;

/// Spec and status of a deployment as read at `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub spec: DeploymentSpec,
    pub status: DeploymentStatus,
    pub version: String,
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn read(&self, name: &str) -> StateResult<Versioned>;

    /// Replace the status if the stored version still equals `version`.
    /// Returns the new version.
    async fn compare_and_swap_status(
        &self,
        name: &str,
        version: &str,
        status: &DeploymentStatus,
    ) -> StateResult<String>;

    /// Replace the spec if the stored version still equals `version`.
    async fn compare_and_swap_spec(
        &self,
        name: &str,
        version: &str,
        spec: &DeploymentSpec,
    ) -> StateResult<String>;
}

/// A store whose reads and writes each run under one deadline.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn StatusStore>,
    timeout: Timeout,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn StatusStore>, timeout: Timeout) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl StatusStore for TimedStore {
    async fn read(&self, name: &str) -> StateResult<Versioned> {
        self.timeout.run(self.inner.read(name)).await?
    }

    async fn compare_and_swap_status(
        &self,
        name: &str,
        version: &str,
        status: &DeploymentStatus,
    ) -> StateResult<String> {
        self.timeout
            .run(self.inner.compare_and_swap_status(name, version, status))
            .await?
    }

    async fn compare_and_swap_spec(
        &self,
        name: &str,
        version: &str,
        spec: &DeploymentSpec,
    ) -> StateResult<String> {
        self.timeout
            .run(self.inner.compare_and_swap_spec(name, version, spec))
            .await?
    }
}

/// Apply `mutate` to a fresh copy of the status and write it back.
///
/// `mutate` returns false when nothing needs writing. On conflict the
/// local mutation is dropped and re-applied to a fresh read. Returns
/// whether a write happened.
pub async fn with_status_update<S, F>(store: &S, name: &str, mut mutate: F) -> StateResult<bool>
where
    S: StatusStore + ?Sized,
    F: FnMut(&mut DeploymentStatus) -> bool + Send,
{
    for attempt in 1..=MAX_CONFLICT_RETRIES {
        let current = store.read(name).await?;
        let mut status = current.status;
        if !mutate(&mut status) {
            return Ok(false);
        }
        match store
            .compare_and_swap_status(name, &current.version, &status)
            .await
        {
            Ok(_) => return Ok(true),
            Err(StateError::Conflict(_)) => {
                debug!(deployment = %name, attempt, "status write conflict, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(StateError::RetriesExhausted {
        name: name.to_string(),
        attempts: MAX_CONFLICT_RETRIES,
    })
}

/// Spec counterpart of [`with_status_update`].
pub async fn with_spec_update<S, F>(store: &S, name: &str, mut mutate: F) -> StateResult<bool>
where
    S: StatusStore + ?Sized,
    F: FnMut(&mut DeploymentSpec) -> bool + Send,
{
    for attempt in 1..=MAX_CONFLICT_RETRIES {
        let current = store.read(name).await?;
        let mut spec = current.spec;
        if !mutate(&mut spec) {
            return Ok(false);
        }
        match store
            .compare_and_swap_spec(name, &current.version, &spec)
            .await
        {
            Ok(_) => return Ok(true),
            Err(StateError::Conflict(_)) => {
                debug!(deployment = %name, attempt, "spec write conflict, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(StateError::RetriesExhausted {
        name: name.to_string(),
        attempts: MAX_CONFLICT_RETRIES,
    })
}
