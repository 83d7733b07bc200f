use serde::{Deserialize, Serialize};

/// Caller-supplied options for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentOptions {
    /// Re-establish the deployment when the process restarts
    pub recoverable: bool,
    /// The deployer owns the backing file and deletes it on undeploy
    pub deployer_owned: bool,
    /// Wait for activation to complete before returning
    pub synchronous: bool,
}

impl DeploymentOptions {
    pub fn new(recoverable: bool, deployer_owned: bool, synchronous: bool) -> Self {
        Self {
            recoverable,
            deployer_owned,
            synchronous,
        }
    }

    /// Options for a deployment that returns without waiting for activation
    pub fn asynchronous() -> Self {
        Self {
            synchronous: false,
            ..Self::default()
        }
    }
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            recoverable: true,
            deployer_owned: false,
            synchronous: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let options: DeploymentOptions =
            serde_json::from_str(r#"{ "deployer_owned": true }"#).unwrap();
        assert_eq!(options, DeploymentOptions::new(true, true, true));
        assert!(!DeploymentOptions::asynchronous().synchronous);
    }
}
