//! Global deadline policy for outbound calls.
//!
//! Every call that leaves the process (Kubernetes API, database admin
//! endpoint) runs under one of three budgets. An elapsed deadline is an
//! ordinary recoverable error; callers log it and retry on the next tick.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// A deadline elapsed before the wrapped call finished.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} call timed out after {after:?}")]
pub struct TimeoutError {
    pub kind: &'static str,
    pub after: Duration,
}

/// One named deadline budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    kind: &'static str,
    duration: Duration,
}

impl Timeout {
    pub fn new(kind: &'static str, duration: Duration) -> Self {
        Self { kind, duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `fut` under this deadline.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.duration, fut)
            .await
            .map_err(|_| TimeoutError {
                kind: self.kind,
                after: self.duration,
            })
    }
}

/// Deadline budgets shared by every deployment loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    kubernetes: Duration,
    database: Duration,
    reconciliation: Duration,
}

impl Timeouts {
    pub fn new(kubernetes: Duration, database: Duration, reconciliation: Duration) -> Self {
        Self {
            kubernetes,
            database,
            reconciliation,
        }
    }

    /// Budget for a single Kubernetes API request.
    pub fn kubernetes(&self) -> Timeout {
        Timeout::new("kubernetes", self.kubernetes)
    }

    /// Budget for a single request to a database member.
    pub fn database(&self) -> Timeout {
        Timeout::new("database", self.database)
    }

    /// Budget for one whole reconciliation pass.
    pub fn reconciliation(&self) -> Timeout {
        Timeout::new("reconciliation", self.reconciliation)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(60),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let timeout = Timeout::new("test", Duration::from_secs(1));
        let value = timeout.run(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_an_error() {
        let timeout = Timeouts::default().kubernetes();
        let err = timeout
            .run(tokio::time::sleep(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "kubernetes");
        assert_eq!(err.after, Duration::from_secs(2));
    }
}
