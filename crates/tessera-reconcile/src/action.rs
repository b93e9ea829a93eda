//! The action contract used by the executor.
//!
//! An action is started once. When `start` reports it is not done yet,
//! the executor records the start time and polls `check_progress` on
//! later passes until the action is ready, aborts, or runs past its
//! timeout.

use std::time::Duration;

use async_trait::async_trait;

use tessera_state::Action as PlannedAction;

use crate::context::DeploymentContext;
use crate::error::ActionResult;

/// Timeout of actions that do not pick their own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Result of polling a started action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub ready: bool,
    /// Drop the plan; the builder re-plans on the next pass.
    pub abort: bool,
}

impl Progress {
    pub fn ready() -> Self {
        Self {
            ready: true,
            abort: false,
        }
    }

    pub fn pending() -> Self {
        Self::default()
    }

    pub fn abort() -> Self {
        Self {
            ready: false,
            abort: true,
        }
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    /// The planned action this handler executes.
    fn planned(&self) -> &PlannedAction;

    /// Zero disables the timeout.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Perform the side effect. `Ok(true)` means done.
    async fn start(&self, ctx: &DeploymentContext) -> ActionResult<bool>;

    async fn check_progress(&self, _ctx: &DeploymentContext) -> ActionResult<Progress> {
        Ok(Progress::ready())
    }
}
