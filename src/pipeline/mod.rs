//! # Install Pipeline
//!
//! Ordered stages applied to a freshly constructed subgraph before it is
//! committed. Each stage sees the whole graph, the root of the subgraph being
//! installed and an [`InstallEnvironment`] carrying the services stages need and
//! the ownership ledger used to unwind a failed install.
//!
//! Stages walk the subgraph with the graph's visitor, so a node shared along
//! several paths is processed once per pass. Behaviour that differs by artifact
//! type is selected through [`crate::artifact::ArtifactType`] capability checks.
//!
//! The first stage to fail aborts the pipeline; the caller then rolls back the
//! nodes recorded as owned in the ledger.

pub mod commit;
pub mod dependency;
pub mod environment;
pub mod import;
pub mod scope;
pub mod validation;

pub use commit::CommitStage;
pub use dependency::DependencyExpansionStage;
pub use environment::{InstallEnvironment, OwnershipLedger};
pub use import::{ImportExpander, ImportExpansionStage, NoImportExpansion};
pub use scope::ScopeStage;
pub use validation::ValidationStage;

use crate::error::Result;
use crate::graph::{InstallGraph, NodeId};
use tracing::{debug, warn};

/// One transformation or validation step of the install pipeline
pub trait PipelineStage: Send + Sync {
    /// Process the subgraph rooted at `root`
    fn process(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        env: &mut InstallEnvironment<'_>,
    ) -> Result<()>;

    /// Get a description of this stage for logging
    fn description(&self) -> &'static str;
}

/// Ordered list of stages, itself usable as a stage
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stages every install runs through, in order
    pub fn standard() -> Self {
        Self::new()
            .with_stage(ScopeStage)
            .with_stage(ImportExpansionStage)
            .with_stage(DependencyExpansionStage)
            .with_stage(ValidationStage)
            .with_stage(CommitStage)
    }

    pub fn with_stage(mut self, stage: impl PipelineStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_descriptions(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.description()).collect()
    }
}

impl PipelineStage for Pipeline {
    fn process(
        &self,
        graph: &mut InstallGraph,
        root: NodeId,
        env: &mut InstallEnvironment<'_>,
    ) -> Result<()> {
        for stage in &self.stages {
            debug!(stage = stage.description(), root = %root, "Running pipeline stage");
            if let Err(err) = stage.process(graph, root, env) {
                warn!(
                    stage = stage.description(),
                    root = %root,
                    error = %err,
                    "Pipeline stage failed"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "pipeline"
    }
}
