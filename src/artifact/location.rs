use crate::error::{DeploymentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Normalised source location of an artifact, `scheme:path`.
///
/// Bare paths are treated as `file:` locations. Which schemes are actually
/// deployable is decided by the configured artifact source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    scheme: String,
    path: String,
}

impl Location {
    pub const FILE_SCHEME: &'static str = "file";

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DeploymentError::general("Empty artifact location"));
        }

        let (scheme, rest) = match raw.split_once(':') {
            Some((scheme, rest))
                if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                (scheme.to_ascii_lowercase(), rest)
            }
            _ => (Self::FILE_SCHEME.to_string(), raw),
        };

        let path = if scheme == Self::FILE_SCHEME {
            let rest = rest.strip_prefix("//").unwrap_or(rest);
            normalize_path(Path::new(rest))
        } else {
            rest.trim_start_matches('/').to_string()
        };

        if path.is_empty() {
            return Err(DeploymentError::general(format!(
                "Location has no path: {raw}"
            )));
        }

        Ok(Self { scheme, path })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            scheme: Self::FILE_SCHEME.to_string(),
            path: normalize_path(path.as_ref()),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_file(&self) -> bool {
        self.scheme == Self::FILE_SCHEME
    }

    /// Last path segment, used as the generated file name in the registry
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.path)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

fn normalize_path(path: &Path) -> String {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().into_owned()
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path)
    }
}
