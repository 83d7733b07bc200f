//! Shared-node lookup.
//!
//! Before a new graph node is created for an artifact the deployer asks whether
//! an equivalent node already hangs off one of the GC roots. A match is reused
//! (shared) rather than duplicated. When several nodes match, the first one met
//! by the depth-first walk wins; callers must not rely on any further ordering.

use super::{InstallGraph, NodeId, VisitOutcome};
use crate::artifact::{ArtifactIdentity, ArtifactType, VersionRange};

pub struct SharedNodeLocator;

impl SharedNodeLocator {
    /// First node reachable from the roots with this type, name and scope whose
    /// version falls within `range`
    pub fn find(
        graph: &InstallGraph,
        artifact_type: ArtifactType,
        name: &str,
        range: &VersionRange,
        scope: Option<&str>,
    ) -> Option<NodeId> {
        let mut found = None;
        graph.visit_from_roots(|id, node| {
            let identity = node.artifact().identity();
            if identity.artifact_type == artifact_type
                && identity.name == name
                && identity.scope_name.as_deref() == scope
                && range.includes(&identity.version)
            {
                found = Some(id);
                VisitOutcome::Stop
            } else {
                VisitOutcome::Continue
            }
        });
        found
    }

    /// Node with exactly this identity, if one is reachable from the roots
    pub fn find_identity(graph: &InstallGraph, identity: &ArtifactIdentity) -> Option<NodeId> {
        Self::find(
            graph,
            identity.artifact_type,
            &identity.name,
            &VersionRange::exact(&identity.version),
            identity.scope_name.as_deref(),
        )
    }
}
