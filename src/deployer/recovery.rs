use super::options::DeploymentOptions;
use crate::artifact::Location;
use serde::{Deserialize, Serialize};

/// Ordered record of recoverable deployments, replayed at process restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryLog {
    entries: Vec<RecoveryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEntry {
    pub location: Location,
    pub options: DeploymentOptions,
}

impl RecoveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `location`, keeping its original position if already present
    pub fn add(&mut self, location: Location, options: DeploymentOptions) {
        match self.entries.iter_mut().find(|entry| entry.location == location) {
            Some(entry) => entry.options = options,
            None => self.entries.push(RecoveryEntry { location, options }),
        }
    }

    pub fn remove(&mut self, location: &Location) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.location != location);
        self.entries.len() != before
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.entries.iter().any(|entry| &entry.location == location)
    }

    pub fn options_for(&self, location: &Location) -> Option<DeploymentOptions> {
        self.entries
            .iter()
            .find(|entry| &entry.location == location)
            .map(|entry| entry.options)
    }

    /// Entries in the order they were first recorded
    pub fn entries(&self) -> &[RecoveryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
