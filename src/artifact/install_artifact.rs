use super::{ArtifactDescriptor, ArtifactIdentity, ArtifactType, Location};
use crate::state_machine::{ArtifactState, ModuleId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug)]
struct ArtifactInner {
    state: ArtifactState,
    descriptor: ArtifactDescriptor,
    module: Option<ModuleId>,
}

/// An artifact held by a node of the install graph.
///
/// Identity and location are fixed at construction. State, the cached module
/// handle and the descriptor sit behind a lock scoped to this artifact alone, so
/// they can be read while the deployer's structural lock is held elsewhere.
#[derive(Debug)]
pub struct InstallArtifact {
    identity: ArtifactIdentity,
    location: Location,
    inner: Mutex<ArtifactInner>,
    deployment_properties: Mutex<HashMap<String, String>>,
}

impl InstallArtifact {
    pub fn new(
        identity: ArtifactIdentity,
        location: Location,
        descriptor: ArtifactDescriptor,
    ) -> Self {
        let deployment_properties = descriptor.properties.clone();
        Self {
            identity,
            location,
            inner: Mutex::new(ArtifactInner {
                state: ArtifactState::Initial,
                descriptor,
                module: None,
            }),
            deployment_properties: Mutex::new(deployment_properties),
        }
    }

    pub fn identity(&self) -> &ArtifactIdentity {
        &self.identity
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.identity.artifact_type
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn scope_name(&self) -> Option<&str> {
        self.identity.scope_name.as_deref()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Raw lifecycle state
    pub fn state(&self) -> ArtifactState {
        self.inner.lock().state
    }

    /// State as reported to callers; fragments never appear started
    pub fn external_state(&self) -> ArtifactState {
        let state = self.state();
        if self.artifact_type() == ArtifactType::Fragment {
            state.fragment_view()
        } else {
            state
        }
    }

    pub fn set_state(&self, state: ArtifactState) -> ArtifactState {
        std::mem::replace(&mut self.inner.lock().state, state)
    }

    /// Move to `state` unless the artifact is mid-refresh, being uninstalled or gone.
    ///
    /// Returns `false` when the update was suppressed.
    pub fn observe_state(&self, state: ArtifactState) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ArtifactState::Refreshing | ArtifactState::Uninstalling
                if state != ArtifactState::Uninstalled =>
            {
                false
            }
            ArtifactState::Uninstalled => false,
            _ => {
                inner.state = state;
                true
            }
        }
    }

    pub fn descriptor(&self) -> ArtifactDescriptor {
        self.inner.lock().descriptor.clone()
    }

    /// Replace the descriptor before the artifact is installed
    pub fn set_descriptor(&self, descriptor: ArtifactDescriptor) {
        self.inner.lock().descriptor = descriptor;
    }

    pub fn module_id(&self) -> Option<ModuleId> {
        self.inner.lock().module
    }

    pub fn set_module_id(&self, module: Option<ModuleId>) {
        self.inner.lock().module = module;
    }

    /// Enter `Refreshing` with a new descriptor, returning what to restore on failure
    pub fn begin_refresh(
        &self,
        descriptor: ArtifactDescriptor,
    ) -> (ArtifactState, ArtifactDescriptor) {
        let mut inner = self.inner.lock();
        let prior_state = std::mem::replace(&mut inner.state, ArtifactState::Refreshing);
        let prior_descriptor = std::mem::replace(&mut inner.descriptor, descriptor);
        (prior_state, prior_descriptor)
    }

    pub fn end_refresh(&self, state: ArtifactState, restore: Option<ArtifactDescriptor>) {
        let mut inner = self.inner.lock();
        inner.state = state;
        if let Some(descriptor) = restore {
            inner.descriptor = descriptor;
        }
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.deployment_properties.lock().get(key).cloned()
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.deployment_properties
            .lock()
            .insert(key.into(), value.into());
    }

    pub fn deployment_properties(&self) -> HashMap<String, String> {
        self.deployment_properties.lock().clone()
    }
}
