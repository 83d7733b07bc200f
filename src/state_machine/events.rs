use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle the module runtime assigns to an installed module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Lifecycle transitions reported asynchronously by the module runtime.
///
/// These arrive whether or not the deployer asked for the transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ModuleEvent {
    Resolved,
    Starting,
    Started,
    /// Activation failed; the module falls back to resolved
    StartFailed(String),
    Stopping,
    Stopped,
    Unresolved,
    Uninstalled,
}

impl ModuleEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::StartFailed(_) => "start_failed",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unresolved => "unresolved",
            Self::Uninstalled => "uninstalled",
        }
    }

    /// Extract the failure reason if this is a failed activation
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::StartFailed(reason) => Some(reason),
            _ => None,
        }
    }
}
