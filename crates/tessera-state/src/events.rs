//! Operator-visible events attached to a deployment.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentEvent {
    pub deployment: String,
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

impl DeploymentEvent {
    pub fn warning(deployment: &str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            deployment: deployment.to_string(),
            kind: EventKind::Warning,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn normal(deployment: &str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            deployment: deployment.to_string(),
            kind: EventKind::Normal,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

/// Sink for deployment events. Recording is best effort.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: DeploymentEvent);
}

/// Recorder that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

#[async_trait]
impl EventRecorder for LogEvents {
    async fn record(&self, event: DeploymentEvent) {
        match event.kind {
            EventKind::Normal => {
                info!(deployment = %event.deployment, reason = %event.reason, "{}", event.message)
            }
            EventKind::Warning => {
                warn!(deployment = %event.deployment, reason = %event.reason, "{}", event.message)
            }
        }
    }
}

/// Recorder that keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryEvents {
    events: Mutex<Vec<DeploymentEvent>>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeploymentEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventRecorder for MemoryEvents {
    async fn record(&self, event: DeploymentEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
