//! Execution context bracketing for lifecycle calls.
//!
//! Every externally visible lifecycle operation runs inside a `lifecycle` span
//! naming the operation and the artifact. The span is entered through a guard,
//! so the caller's previous context is restored when the guard drops, including
//! on early return with an error or on unwinding.

use crate::artifact::ArtifactIdentity;
use tracing::span::EnteredSpan;

#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ExecutionContext {
    _span: EnteredSpan,
}

impl ExecutionContext {
    pub fn enter(operation: &'static str, artifact: &ArtifactIdentity) -> Self {
        let span = tracing::info_span!("lifecycle", operation, artifact = %artifact);
        Self {
            _span: span.entered(),
        }
    }
}
