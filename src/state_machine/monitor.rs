//! # Artifact State Monitor
//!
//! Bridges the module runtime's asynchronous lifecycle events onto artifact state
//! and onto the completion signals of starts the deployer asked for.
//!
//! Starts the deployer initiates are recorded as *solicited*, each with the
//! signals waiting on it. A `Started` for a solicited module completes those
//! signals; one for any other module only updates state, so a third party
//! starting a shared module is never counted as completing our own start.

use super::events::{ModuleEvent, ModuleId};
use super::runtime::{ModuleListener, ModuleRuntimeResult};
use super::states::ArtifactState;
use crate::artifact::InstallArtifact;
use crate::constants::events;
use crate::error::DeploymentError;
use crate::events::EventLog;
use crate::signal::AbortableSignal;
use dashmap::DashMap;
use serde_json::json;
use std::sync::{Arc, Weak};
use tracing::debug;

pub struct StateMonitor {
    artifacts: DashMap<ModuleId, Weak<InstallArtifact>>,
    solicited: DashMap<ModuleId, Vec<Arc<dyn AbortableSignal>>>,
    event_log: EventLog,
}

impl StateMonitor {
    pub fn new(event_log: EventLog) -> Self {
        Self {
            artifacts: DashMap::new(),
            solicited: DashMap::new(),
            event_log,
        }
    }

    /// Route events for `module` to `artifact`; the artifact is not kept alive
    pub fn track(&self, module: ModuleId, artifact: &Arc<InstallArtifact>) {
        self.artifacts.insert(module, Arc::downgrade(artifact));
    }

    pub fn untrack(&self, module: ModuleId) {
        self.artifacts.remove(&module);
    }

    /// Record a start the deployer is about to initiate
    pub fn solicit_start(&self, module: ModuleId, signal: Arc<dyn AbortableSignal>) {
        self.solicited.entry(module).or_default().push(signal);
    }

    /// Withdraw a solicited start, returning the signals that were waiting on it
    pub fn withdraw_start(&self, module: ModuleId) -> Vec<Arc<dyn AbortableSignal>> {
        self.solicited
            .remove(&module)
            .map(|(_, signals)| signals)
            .unwrap_or_default()
    }

    pub fn is_solicited(&self, module: ModuleId) -> bool {
        self.solicited.contains_key(&module)
    }

    fn artifact(&self, module: ModuleId) -> Option<Arc<InstallArtifact>> {
        self.artifacts.get(&module).and_then(|weak| weak.upgrade())
    }

    fn observe(&self, artifact: Option<&Arc<InstallArtifact>>, state: ArtifactState) -> bool {
        artifact.is_some_and(|artifact| artifact.observe_state(state))
    }
}

impl ModuleListener for StateMonitor {
    fn module_changed(&self, module: ModuleId, event: &ModuleEvent) -> ModuleRuntimeResult<()> {
        let artifact = self.artifact(module);
        let name = artifact
            .as_ref()
            .map(|a| a.identity().to_string())
            .unwrap_or_else(|| module.to_string());

        debug!(
            module = %module,
            artifact = %name,
            event = event.event_type(),
            solicited = self.is_solicited(module),
            "Module lifecycle event"
        );

        match event {
            ModuleEvent::Resolved => {
                if let Some(artifact) = &artifact {
                    if artifact.state() == ArtifactState::Installed {
                        artifact.observe_state(ArtifactState::Resolved);
                    }
                }
            }
            ModuleEvent::Starting => {
                let observed = self.observe(artifact.as_ref(), ArtifactState::Starting);
                // Restarts inside a refresh are suppressed and not reported
                if observed && !self.is_solicited(module) {
                    self.event_log
                        .log(events::UNSOLICITED_START, &name, json!({ "module": module.0 }));
                }
            }
            ModuleEvent::Started => {
                self.observe(artifact.as_ref(), ArtifactState::Active);
                let signals = self.withdraw_start(module);
                if !signals.is_empty() {
                    self.event_log.log(events::STARTED, &name, json!({ "module": module.0 }));
                }
                for signal in signals {
                    signal.signal_successful_completion();
                }
            }
            ModuleEvent::StartFailed(reason) => {
                self.observe(artifact.as_ref(), ArtifactState::Resolved);
                self.event_log.log(
                    events::START_FAILED,
                    &name,
                    json!({ "module": module.0, "reason": reason }),
                );
                for signal in self.withdraw_start(module) {
                    signal.signal_failure(DeploymentError::Runtime(format!(
                        "Start of {name} failed: {reason}"
                    )));
                }
            }
            ModuleEvent::Stopping => {
                self.observe(artifact.as_ref(), ArtifactState::Stopping);
            }
            ModuleEvent::Stopped => {
                self.observe(artifact.as_ref(), ArtifactState::Stopped);
                for signal in self.withdraw_start(module) {
                    signal.signal_aborted();
                }
            }
            ModuleEvent::Unresolved => {
                self.observe(artifact.as_ref(), ArtifactState::Installed);
            }
            ModuleEvent::Uninstalled => {
                self.observe(artifact.as_ref(), ArtifactState::Uninstalled);
                for signal in self.withdraw_start(module) {
                    signal.signal_aborted();
                }
                self.untrack(module);
            }
        }
        Ok(())
    }
}
