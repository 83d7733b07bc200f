//! Shared fixtures for deployer integration tests

#![allow(dead_code)]

use deployer_core::artifact::{ArtifactDescriptor, ArtifactReference, Location, VersionRange};
use deployer_core::config::DeployerConfig;
use deployer_core::deployer::{ApplicationDeployer, ArtifactSource, InMemoryArtifactSource};
use deployer_core::error::DeploymentError;
use deployer_core::events::DeploymentEvent;
use deployer_core::pipeline::ImportExpander;
use deployer_core::signal::{AbortableSignal, Signal};
use deployer_core::state_machine::InMemoryModuleRuntime;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

pub const START_TIMEOUT: Duration = Duration::from_secs(5);

/// A deployer over an in-memory runtime and an in-memory artifact source
pub struct TestDeployment {
    pub runtime: Arc<InMemoryModuleRuntime>,
    pub source: Arc<InMemoryArtifactSource>,
    pub deployer: ApplicationDeployer,
}

impl TestDeployment {
    pub fn new() -> Self {
        Self::with_timeout(START_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let runtime = Arc::new(InMemoryModuleRuntime::new());
        let source = Arc::new(InMemoryArtifactSource::new());
        let deployer = ApplicationDeployer::new(
            runtime.clone(),
            source.clone() as Arc<dyn ArtifactSource>,
            &DeployerConfig::default(),
        )
        .with_start_timeout(timeout);
        Self {
            runtime,
            source,
            deployer,
        }
    }

    pub fn with_import_expander(mut self, expander: Arc<dyn ImportExpander>) -> Self {
        self.deployer = self.deployer.with_import_expander(expander);
        self
    }

    /// Place `descriptor` at `mem:apps/<name>.json`
    pub fn app(&self, descriptor: ArtifactDescriptor) -> Location {
        let path = format!("apps/{}.json", descriptor.name);
        self.source.insert(&path, descriptor).unwrap()
    }

    pub fn repository(&self, descriptor: ArtifactDescriptor) -> Location {
        self.source.add_to_repository(descriptor).unwrap()
    }

    /// Names of every artifact in the install graph, sorted
    pub fn installed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .deployer
            .installed_artifacts()
            .into_iter()
            .map(|identity| identity.name)
            .collect();
        names.sort();
        names
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.deployer.event_log().subscribe()
    }
}

pub fn requires(name: &str) -> ArtifactReference {
    ArtifactReference::module(name, VersionRange::any())
}

/// Codes of every event received so far
pub fn drain_codes(rx: &mut broadcast::Receiver<DeploymentEvent>) -> Vec<&'static str> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|event| event.code)
        .collect()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Records every call it receives, without latching
#[derive(Default)]
pub struct RecordingSignal {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingSignal {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl Signal for RecordingSignal {
    fn signal_successful_completion(&self) {
        self.calls.lock().push("success");
    }

    fn signal_failure(&self, _cause: DeploymentError) {
        self.calls.lock().push("failure");
    }
}

impl AbortableSignal for RecordingSignal {
    fn signal_aborted(&self) {
        self.calls.lock().push("aborted");
    }
}
