//! Shared constants: event codes, deployment property keys and defaults.

/// Codes of the structured events written to the [`crate::events::EventLog`].
///
/// The trailing letter is the severity: `I` info, `W` warning, `E` error.
pub mod events {
    pub const INSTALLING: &str = "DE0000I";
    pub const INSTALLED: &str = "DE0001I";
    pub const INSTALL_FAILED: &str = "DE0002E";
    pub const STARTING: &str = "DE0004I";
    pub const STARTED: &str = "DE0005I";
    pub const START_FAILED: &str = "DE0006E";
    pub const START_TIMED_OUT: &str = "DE0007W";
    pub const START_ABORTED: &str = "DE0008W";
    pub const UNSOLICITED_START: &str = "DE0009I";
    pub const STOPPING: &str = "DE0010I";
    pub const STOPPED: &str = "DE0011I";
    pub const STOP_FAILED: &str = "DE0012E";
    pub const UNINSTALLING: &str = "DE0013I";
    pub const UNINSTALLED: &str = "DE0014I";
    pub const UNINSTALL_FAILED: &str = "DE0015E";
    pub const REFRESHING: &str = "DE0016I";
    pub const REFRESHED: &str = "DE0017I";
    pub const REFRESH_FAILED: &str = "DE0018E";
    pub const REDEPLOY_ESCALATED: &str = "DE0019W";
    pub const ARTIFACT_NOT_FOUND: &str = "DE0020E";
    pub const STILL_REFERENCED: &str = "DE0021I";
    pub const RECOVERY_DROPPED: &str = "DE0022W";
    pub const BACKING_FILE_DELETE_FAILED: &str = "DE0024W";
}

/// Keys of deployment properties the pipeline writes onto artifacts
pub mod properties {
    /// Scope an artifact was installed into
    pub const SCOPE: &str = "deployer.scope";
    /// Top-level artifact that first caused this artifact to be installed
    pub const ORIGIN: &str = "deployer.origin";
    /// Set on artifacts pulled in from the repository to satisfy a requirement
    pub const PROVISIONED_FOR: &str = "deployer.provisioned-for";
    /// Atomic plan whose lifecycle this artifact shares
    pub const ATOMIC_PLAN: &str = "deployer.atomic-plan";
}

pub mod system {
    /// Default wait for synchronous starts, in seconds
    pub const DEFAULT_START_TIMEOUT_SECONDS: u64 = 300;
    pub const DEFAULT_EVENT_CAPACITY: usize = 1000;
}
