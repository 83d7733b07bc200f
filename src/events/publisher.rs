use crate::constants::system::DEFAULT_EVENT_CAPACITY;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Event that has been written to the log
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentEvent {
    pub code: &'static str,
    pub artifact: Option<String>,
    pub details: Value,
    pub published_at: DateTime<Utc>,
}

/// Broadcasting event log
#[derive(Debug, Clone)]
pub struct EventLog {
    sender: broadcast::Sender<DeploymentEvent>,
}

impl EventLog {
    /// Create a new event log with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Record an event against an artifact
    pub fn log(&self, code: &'static str, artifact: impl Display, details: Value) {
        self.publish(code, Some(artifact.to_string()), details);
    }

    /// Record an event that concerns no particular artifact
    pub fn log_system(&self, code: &'static str, details: Value) {
        self.publish(code, None, details);
    }

    fn publish(&self, code: &'static str, artifact: Option<String>, details: Value) {
        match code.chars().last() {
            Some('E') => error!(code, artifact = artifact.as_deref(), %details, "DEPLOYMENT_EVENT"),
            Some('W') => warn!(code, artifact = artifact.as_deref(), %details, "DEPLOYMENT_EVENT"),
            _ => info!(code, artifact = artifact.as_deref(), %details, "DEPLOYMENT_EVENT"),
        }

        let event = DeploymentEvent {
            code,
            artifact,
            details,
            published_at: Utc::now(),
        };

        // No subscribers is fine: the tracing record above is the durable copy
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
