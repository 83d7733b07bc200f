//! Artifact sources.
//!
//! An [`ArtifactSource`] turns locations into parsed descriptors and serves the
//! repository that unsatisfied requirements and plan children are provisioned
//! from. Manifest formats are the source's business; the deployer only sees
//! [`ArtifactDescriptor`]s.

use crate::artifact::{ArtifactDescriptor, ArtifactReference, Location};
use crate::error::{DeploymentError, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait ArtifactSource: Send + Sync {
    /// Whether locations with this scheme can be read
    fn supports(&self, location: &Location) -> bool;

    fn read_descriptor(&self, location: &Location) -> Result<ArtifactDescriptor>;

    /// Highest-versioned repository artifact satisfying `reference`
    fn find_in_repository(
        &self,
        reference: &ArtifactReference,
    ) -> Result<Option<(Location, ArtifactDescriptor)>>;

    /// Whether the content behind `location` is still present
    fn exists(&self, location: &Location) -> bool;

    /// Remove the content behind `location`
    fn delete(&self, location: &Location) -> Result<()>;
}

/// Pick the best repository candidate for `reference`
fn best_match(
    reference: &ArtifactReference,
    candidates: impl IntoIterator<Item = (Location, ArtifactDescriptor)>,
) -> Option<(Location, ArtifactDescriptor)> {
    candidates
        .into_iter()
        .filter_map(|(location, descriptor)| {
            let identity = descriptor.identity(&location.to_string()).ok()?;
            reference
                .matches(&identity)
                .then_some((identity.version, location, descriptor))
        })
        .max_by(|(a, ..), (b, ..)| a.cmp(b))
        .map(|(_, location, descriptor)| (location, descriptor))
}

/// Reads JSON descriptor files from disk.
///
/// The optional repository is a directory of `*.json` descriptors scanned on
/// each lookup.
#[derive(Debug, Clone, Default)]
pub struct FileSystemArtifactSource {
    repository: Option<PathBuf>,
}

impl FileSystemArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: Some(repository.into()),
        }
    }

    fn read_path(path: &Path) -> Result<ArtifactDescriptor> {
        let content =
            fs::read_to_string(path).map_err(|e| DeploymentError::io(path.display(), &e))?;
        serde_json::from_str(&content).map_err(|e| DeploymentError::IdentityIndeterminate {
            location: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl ArtifactSource for FileSystemArtifactSource {
    fn supports(&self, location: &Location) -> bool {
        location.is_file()
    }

    fn read_descriptor(&self, location: &Location) -> Result<ArtifactDescriptor> {
        Self::read_path(&location.to_path_buf())
    }

    fn find_in_repository(
        &self,
        reference: &ArtifactReference,
    ) -> Result<Option<(Location, ArtifactDescriptor)>> {
        let Some(repository) = &self.repository else {
            return Ok(None);
        };
        let entries =
            fs::read_dir(repository).map_err(|e| DeploymentError::io(repository.display(), &e))?;

        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_path(&path) {
                Ok(descriptor) => candidates.push((Location::from_path(&path), descriptor)),
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Skipping unreadable repository entry"
                    )
                }
            }
        }
        debug!(reference = %reference, candidates = candidates.len(), "Searched repository");
        Ok(best_match(reference, candidates))
    }

    fn exists(&self, location: &Location) -> bool {
        location.to_path_buf().exists()
    }

    fn delete(&self, location: &Location) -> Result<()> {
        let path = location.to_path_buf();
        fs::remove_file(&path).map_err(|e| DeploymentError::io(path.display(), &e))
    }
}

/// Keeps descriptors in memory under `mem:` locations
#[derive(Debug, Default)]
pub struct InMemoryArtifactSource {
    artifacts: DashMap<Location, ArtifactDescriptor>,
    repository: RwLock<Vec<(Location, ArtifactDescriptor)>>,
}

impl InMemoryArtifactSource {
    pub const SCHEME: &'static str = "mem";

    pub fn new() -> Self {
        Self::default()
    }

    /// Store `descriptor` at `mem:<path>` and return the location
    pub fn insert(&self, path: &str, descriptor: ArtifactDescriptor) -> Result<Location> {
        let location = Location::parse(&format!("{}:{path}", Self::SCHEME))?;
        self.artifacts.insert(location.clone(), descriptor);
        Ok(location)
    }

    pub fn remove(&self, location: &Location) -> Option<ArtifactDescriptor> {
        self.artifacts.remove(location).map(|(_, descriptor)| descriptor)
    }

    /// Make `descriptor` available for provisioning
    pub fn add_to_repository(&self, descriptor: ArtifactDescriptor) -> Result<Location> {
        let location = Location::parse(&format!(
            "{}:repository/{}-{}",
            Self::SCHEME,
            descriptor.name,
            descriptor.version
        ))?;
        self.artifacts.insert(location.clone(), descriptor.clone());
        self.repository.write().push((location.clone(), descriptor));
        Ok(location)
    }
}

impl ArtifactSource for InMemoryArtifactSource {
    fn supports(&self, location: &Location) -> bool {
        location.scheme() == Self::SCHEME
    }

    fn read_descriptor(&self, location: &Location) -> Result<ArtifactDescriptor> {
        self.artifacts
            .get(location)
            .map(|descriptor| descriptor.clone())
            .ok_or_else(|| DeploymentError::ArtifactNotFound(location.to_string()))
    }

    fn find_in_repository(
        &self,
        reference: &ArtifactReference,
    ) -> Result<Option<(Location, ArtifactDescriptor)>> {
        Ok(best_match(reference, self.repository.read().clone()))
    }

    fn exists(&self, location: &Location) -> bool {
        self.artifacts.contains_key(location)
    }

    fn delete(&self, location: &Location) -> Result<()> {
        self.remove(location)
            .map(|_| ())
            .ok_or_else(|| DeploymentError::ArtifactNotFound(location.to_string()))
    }
}
