use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an installed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    /// Constructed in the install graph, not yet installed
    Initial,
    Installing,
    Installed,
    /// Dependencies wired by the module runtime
    Resolved,
    Starting,
    Active,
    Stopping,
    Stopped,
    Uninstalling,
    Uninstalled,
    /// Metadata being re-read; returns to the prior state afterwards
    Refreshing,
}

impl ArtifactState {
    /// States from which `start` is accepted
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Installed | Self::Resolved | Self::Stopped)
    }

    pub fn is_installed(&self) -> bool {
        !matches!(
            self,
            Self::Initial | Self::Installing | Self::Uninstalling | Self::Uninstalled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Uninstalled)
    }

    /// State reported for a fragment, which cannot be started independently
    pub fn fragment_view(&self) -> Self {
        match self {
            Self::Starting | Self::Active | Self::Stopping => Self::Resolved,
            other => *other,
        }
    }
}

impl Default for ArtifactState {
    fn default() -> Self {
        Self::Initial
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Resolved => "resolved",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Uninstalling => "uninstalling",
            Self::Uninstalled => "uninstalled",
            Self::Refreshing => "refreshing",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ArtifactState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "installing" => Ok(Self::Installing),
            "installed" => Ok(Self::Installed),
            "resolved" => Ok(Self::Resolved),
            "starting" => Ok(Self::Starting),
            "active" => Ok(Self::Active),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "uninstalling" => Ok(Self::Uninstalling),
            "uninstalled" => Ok(Self::Uninstalled),
            "refreshing" => Ok(Self::Refreshing),
            _ => Err(format!("Invalid artifact state: {s}")),
        }
    }
}
