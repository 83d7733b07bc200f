use super::{InstallEnvironment, PipelineStage};
use crate::artifact::{ArtifactDescriptor, ArtifactReference, InstallArtifact};
use crate::error::Result;
use crate::graph::{InstallGraph, NodeId};
use tracing::debug;

/// Pluggable expansion of an artifact's import declarations into requirements
pub trait ImportExpander: Send + Sync {
    /// Requirements implied by `descriptor` beyond those it already declares
    fn expand(&self, descriptor: &ArtifactDescriptor) -> Result<Vec<ArtifactReference>>;
}

/// Expander for containers without import headers
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImportExpansion;

impl ImportExpander for NoImportExpansion {
    fn expand(&self, _descriptor: &ArtifactDescriptor) -> Result<Vec<ArtifactReference>> {
        Ok(Vec::new())
    }
}

/// Merges the import expander's requirements into owned bundle-like artifacts
pub struct ImportExpansionStage;

/// Fold the requirements `expander` derives from `artifact`'s imports into its
/// descriptor
pub(crate) fn expand_imports(
    expander: &dyn ImportExpander,
    artifact: &InstallArtifact,
) -> Result<()> {
    let mut descriptor = artifact.descriptor();
    let expanded = expander.expand(&descriptor)?;
    let before = descriptor.requires.len();
    for requirement in expanded {
        if !descriptor.requires.contains(&requirement) {
            descriptor.requires.push(requirement);
        }
    }
    if descriptor.requires.len() != before {
        debug!(
            artifact = %artifact.identity(),
            added = descriptor.requires.len() - before,
            "Imports expanded into requirements"
        );
        artifact.set_descriptor(descriptor);
    }
    Ok(())
}

impl PipelineStage for ImportExpansionStage {
    fn process(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        env: &mut InstallEnvironment<'_>,
    ) -> Result<()> {
        for id in graph.subgraph(root) {
            let Some(artifact) = graph.artifact(id) else {
                continue;
            };
            if env.is_owned(id) && artifact.artifact_type().is_bundle_like() {
                expand_imports(env.import_expander, artifact)?;
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "import_expansion"
    }
}
