//! # Artifact Lifecycle
//!
//! Drives individual artifacts through install, start, stop, uninstall and
//! refresh against the module runtime. Structural decisions (which nodes to
//! touch and in what order) belong to the caller; this type only applies one
//! transition to the artifacts it is given.
//!
//! Starts are asynchronous: [`ArtifactLifecycle::start`] returns once activation
//! has been initiated and reports the outcome through the supplied signal. A
//! plan's signal fires once every child has reported, via an
//! [`AbortableSignalJunction`].

use super::context::ExecutionContext;
use super::monitor::StateMonitor;
use super::runtime::ModuleRuntime;
use super::states::ArtifactState;
use crate::artifact::{ArtifactDescriptor, ArtifactType, InstallArtifact};
use crate::constants::events;
use crate::error::{DeploymentError, Result};
use crate::events::EventLog;
use crate::graph::ArtifactTree;
use crate::signal::{AbortableSignal, AbortableSignalJunction, Signal};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Completes a plan's start once its children have reported
struct PlanStartSignal {
    plan: Arc<InstallArtifact>,
    downstream: Arc<dyn AbortableSignal>,
}

impl Signal for PlanStartSignal {
    fn signal_successful_completion(&self) {
        self.plan.observe_state(ArtifactState::Active);
        self.downstream.signal_successful_completion();
    }

    fn signal_failure(&self, cause: DeploymentError) {
        self.plan.observe_state(ArtifactState::Resolved);
        self.downstream.signal_failure(cause);
    }
}

impl AbortableSignal for PlanStartSignal {
    fn signal_aborted(&self) {
        self.plan.observe_state(ArtifactState::Resolved);
        self.downstream.signal_aborted();
    }
}

pub struct ArtifactLifecycle {
    runtime: Arc<dyn ModuleRuntime>,
    monitor: Arc<StateMonitor>,
    event_log: EventLog,
}

impl ArtifactLifecycle {
    /// Create a lifecycle over `runtime`, registering its state monitor as a listener
    pub fn new(runtime: Arc<dyn ModuleRuntime>, event_log: EventLog) -> Self {
        let monitor = Arc::new(StateMonitor::new(event_log.clone()));
        runtime.add_listener(monitor.clone());
        Self {
            runtime,
            monitor,
            event_log,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ModuleRuntime> {
        &self.runtime
    }

    pub fn monitor(&self) -> &Arc<StateMonitor> {
        &self.monitor
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Install a single artifact; artifacts past `Initial` are left alone
    pub fn install(&self, artifact: &Arc<InstallArtifact>) -> Result<()> {
        if artifact.state() != ArtifactState::Initial {
            return Ok(());
        }
        let _context = ExecutionContext::enter("install", artifact.identity());

        artifact.set_state(ArtifactState::Installing);
        self.event_log.log(events::INSTALLING, artifact.identity(), json!({}));

        if artifact.artifact_type().is_bundle_like() {
            let installed = self
                .runtime
                .install(&artifact.descriptor(), artifact.location());
            match installed {
                Ok(module) => {
                    artifact.set_module_id(Some(module));
                    self.monitor.track(module, artifact);
                }
                Err(err) => {
                    artifact.set_state(ArtifactState::Initial);
                    self.event_log.log(
                        events::INSTALL_FAILED,
                        artifact.identity(),
                        json!({ "reason": err.to_string() }),
                    );
                    return Err(err.into());
                }
            }
        }

        artifact.set_state(ArtifactState::Installed);
        self.event_log.log(
            events::INSTALLED,
            artifact.identity(),
            json!({ "module": artifact.module_id().map(|m| m.0) }),
        );
        Ok(())
    }

    /// Initiate the start of `tree`, reporting completion through `signal`.
    ///
    /// An `Err` means the start was refused outright and `signal` was not fired.
    /// Activation failures after that point arrive through the signal.
    pub fn start(&self, tree: &ArtifactTree, signal: Arc<dyn AbortableSignal>) -> Result<()> {
        let artifact = &tree.artifact;
        let _context = ExecutionContext::enter("start", artifact.identity());

        match artifact.artifact_type() {
            ArtifactType::Plan => self.start_plan(tree, signal),
            ArtifactType::Fragment => {
                self.check_startable(artifact)?;
                artifact.observe_state(ArtifactState::Active);
                signal.signal_successful_completion();
                Ok(())
            }
            ArtifactType::Module => self.start_module(artifact, signal),
        }
    }

    fn start_plan(&self, tree: &ArtifactTree, signal: Arc<dyn AbortableSignal>) -> Result<()> {
        let plan = &tree.artifact;
        if plan.state() == ArtifactState::Active {
            signal.signal_successful_completion();
            return Ok(());
        }
        self.check_startable(plan)?;
        plan.set_state(ArtifactState::Starting);

        let junction = AbortableSignalJunction::new(
            Arc::new(PlanStartSignal {
                plan: Arc::clone(plan),
                downstream: signal,
            }),
            tree.children.len(),
        );

        for (child, sub_signal) in tree.children.iter().zip(junction.sub_signals()) {
            if let Err(err) = self.start(child, Arc::clone(&sub_signal)) {
                sub_signal.signal_failure(err);
                break;
            }
        }
        Ok(())
    }

    fn start_module(
        &self,
        artifact: &Arc<InstallArtifact>,
        signal: Arc<dyn AbortableSignal>,
    ) -> Result<()> {
        let state = artifact.state();
        if state == ArtifactState::Active {
            signal.signal_successful_completion();
            return Ok(());
        }
        if state != ArtifactState::Starting {
            self.check_startable(artifact)?;
        }
        let Some(module) = artifact.module_id() else {
            return Err(self.invalid_transition(artifact, "start"));
        };

        self.event_log.log(events::STARTING, artifact.identity(), json!({ "module": module.0 }));
        self.monitor.solicit_start(module, signal);

        if let Err(err) = self.runtime.start(module) {
            let cause = DeploymentError::from(err);
            self.event_log.log(
                events::START_FAILED,
                artifact.identity(),
                json!({ "module": module.0, "reason": cause.to_string() }),
            );
            for waiting in self.monitor.withdraw_start(module) {
                waiting.signal_failure(cause.clone());
            }
            return Ok(());
        }

        // Activation may have completed before our start was recorded
        if artifact.state() == ArtifactState::Active {
            for waiting in self.monitor.withdraw_start(module) {
                waiting.signal_successful_completion();
            }
        }
        Ok(())
    }

    /// Stop a single artifact; anything not running is left alone
    pub fn stop(&self, artifact: &Arc<InstallArtifact>) -> Result<()> {
        if !matches!(
            artifact.state(),
            ArtifactState::Active | ArtifactState::Starting
        ) {
            return Ok(());
        }
        let _context = ExecutionContext::enter("stop", artifact.identity());
        self.event_log.log(events::STOPPING, artifact.identity(), json!({}));

        if artifact.artifact_type().can_activate() {
            if let Some(module) = artifact.module_id() {
                if let Err(err) = self.runtime.stop(module) {
                    self.event_log.log(
                        events::STOP_FAILED,
                        artifact.identity(),
                        json!({ "module": module.0, "reason": err.to_string() }),
                    );
                    return Err(err.into());
                }
            }
        }

        artifact.observe_state(ArtifactState::Stopped);
        self.event_log.log(events::STOPPED, artifact.identity(), json!({}));
        Ok(())
    }

    /// Uninstall a single artifact from the runtime
    pub fn uninstall(&self, artifact: &Arc<InstallArtifact>) -> Result<()> {
        let prior = artifact.state();
        if prior == ArtifactState::Uninstalled {
            return Ok(());
        }
        let _context = ExecutionContext::enter("uninstall", artifact.identity());
        self.event_log.log(events::UNINSTALLING, artifact.identity(), json!({}));
        artifact.set_state(ArtifactState::Uninstalling);

        if let Some(module) = artifact.module_id() {
            if let Err(err) = self.runtime.uninstall(module) {
                artifact.set_state(prior);
                self.event_log.log(
                    events::UNINSTALL_FAILED,
                    artifact.identity(),
                    json!({ "module": module.0, "reason": err.to_string() }),
                );
                return Err(err.into());
            }
            self.monitor.untrack(module);
            artifact.set_module_id(None);
        }

        artifact.set_state(ArtifactState::Uninstalled);
        self.event_log.log(events::UNINSTALLED, artifact.identity(), json!({}));
        Ok(())
    }

    /// Replace an artifact's descriptor in place, keeping its lifecycle state.
    ///
    /// The new descriptor must carry the same identity. On failure the previous
    /// descriptor and state are restored.
    pub fn refresh(
        &self,
        artifact: &Arc<InstallArtifact>,
        descriptor: ArtifactDescriptor,
    ) -> Result<()> {
        let _context = ExecutionContext::enter("refresh", artifact.identity());
        self.event_log.log(events::REFRESHING, artifact.identity(), json!({}));

        let identity = artifact.identity();
        let unchanged = descriptor
            .identity(&artifact.location().to_string())
            .is_ok_and(|declared| {
                declared.artifact_type == identity.artifact_type
                    && declared.name == identity.name
                    && declared.version == identity.version
            });
        if !unchanged {
            self.event_log.log(
                events::REFRESH_FAILED,
                identity,
                json!({ "reason": "identity changed" }),
            );
            return Err(DeploymentError::general(format!(
                "Cannot refresh {identity} in place: new content declares {} {} {}",
                descriptor.artifact_type, descriptor.name, descriptor.version
            )));
        }

        let (prior_state, prior_descriptor) = artifact.begin_refresh(descriptor.clone());
        if artifact.artifact_type().is_bundle_like() {
            if let Some(module) = artifact.module_id() {
                if let Err(err) = self.runtime.update(module, &descriptor) {
                    artifact.end_refresh(prior_state, Some(prior_descriptor));
                    self.event_log.log(
                        events::REFRESH_FAILED,
                        identity,
                        json!({ "reason": err.to_string() }),
                    );
                    return Err(err.into());
                }
            }
        }

        artifact.end_refresh(prior_state, None);
        debug!(artifact = %identity, state = %prior_state, "Artifact refreshed in place");
        self.event_log.log(events::REFRESHED, identity, json!({}));
        Ok(())
    }

    fn check_startable(&self, artifact: &InstallArtifact) -> Result<()> {
        if artifact.state().can_start() {
            Ok(())
        } else {
            Err(self.invalid_transition(artifact, "start"))
        }
    }

    fn invalid_transition(&self, artifact: &InstallArtifact, operation: &str) -> DeploymentError {
        DeploymentError::InvalidTransition {
            artifact: artifact.identity().to_string(),
            from: artifact.state().to_string(),
            operation: operation.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Location;
    use crate::error::ErrorKind;
    use crate::signal::BlockingSignal;
    use crate::state_machine::in_memory::{Activation, InMemoryModuleRuntime};
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryModuleRuntime>, ArtifactLifecycle) {
        let runtime = Arc::new(InMemoryModuleRuntime::new());
        let lifecycle = ArtifactLifecycle::new(runtime.clone(), EventLog::default());
        (runtime, lifecycle)
    }

    fn artifact(descriptor: ArtifactDescriptor) -> Arc<InstallArtifact> {
        let location = Location::parse(&format!("mem:{}", descriptor.name)).unwrap();
        let identity = descriptor.identity(&location.to_string()).unwrap();
        Arc::new(InstallArtifact::new(identity, location, descriptor))
    }

    fn leaf(artifact: &Arc<InstallArtifact>) -> ArtifactTree {
        ArtifactTree {
            artifact: Arc::clone(artifact),
            children: Vec::new(),
        }
    }

    fn start_and_wait(lifecycle: &ArtifactLifecycle, tree: &ArtifactTree) -> Result<bool> {
        let signal = Arc::new(BlockingSignal::new(true));
        lifecycle.start(tree, signal.clone())?;
        signal.await_completion(Duration::from_secs(5))
    }

    #[test]
    fn test_install_start_stop_uninstall() {
        let (runtime, lifecycle) = setup();
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));

        lifecycle.install(&module).unwrap();
        assert_eq!(module.state(), ArtifactState::Installed);
        assert!(module.module_id().is_some());

        assert!(start_and_wait(&lifecycle, &leaf(&module)).unwrap());
        assert_eq!(module.state(), ArtifactState::Active);

        lifecycle.stop(&module).unwrap();
        assert_eq!(module.state(), ArtifactState::Stopped);

        lifecycle.uninstall(&module).unwrap();
        assert_eq!(module.state(), ArtifactState::Uninstalled);
        assert_eq!(runtime.installed_count(), 0);
    }

    #[test]
    fn test_failed_install_returns_to_initial() {
        let (runtime, lifecycle) = setup();
        runtime.fail_install("m", "corrupt archive");
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));

        let err = lifecycle.install(&module).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(module.state(), ArtifactState::Initial);
    }

    #[test]
    fn test_start_failure_reaches_signal() {
        let (runtime, lifecycle) = setup();
        runtime.set_activation("m", Activation::Fail("activator threw".to_string()));
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));
        lifecycle.install(&module).unwrap();

        let err = start_and_wait(&lifecycle, &leaf(&module)).unwrap_err();
        assert!(err.to_string().contains("activator threw"));
        assert_eq!(module.state(), ArtifactState::Resolved);
    }

    #[test]
    fn test_start_before_install_is_refused() {
        let (_runtime, lifecycle) = setup();
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));
        let signal = Arc::new(BlockingSignal::new(false));
        let err = lifecycle.start(&leaf(&module), signal.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(!signal.is_complete());
    }

    #[test]
    fn test_fragment_start_never_activates_module() {
        let (runtime, lifecycle) = setup();
        let fragment = artifact(ArtifactDescriptor::fragment("f", "1.0.0", "host"));
        lifecycle.install(&fragment).unwrap();

        assert!(start_and_wait(&lifecycle, &leaf(&fragment)).unwrap());
        assert_eq!(fragment.external_state(), ArtifactState::Resolved);
        assert_eq!(runtime.start_count("f"), 0);
    }

    #[test]
    fn test_plan_start_waits_for_every_child() {
        let (runtime, lifecycle) = setup();
        runtime.set_activation("slow", Activation::Manual);
        let plan = artifact(ArtifactDescriptor::plan("p", "1.0.0", false));
        let fast = artifact(ArtifactDescriptor::module("fast", "1.0.0"));
        let slow = artifact(ArtifactDescriptor::module("slow", "1.0.0"));
        for a in [&fast, &slow, &plan] {
            lifecycle.install(a).unwrap();
        }
        let tree = ArtifactTree {
            artifact: plan.clone(),
            children: vec![leaf(&fast), leaf(&slow)],
        };

        let signal = Arc::new(BlockingSignal::new(true));
        lifecycle.start(&tree, signal.clone()).unwrap();
        assert!(!signal.await_completion(Duration::from_millis(100)).unwrap());
        assert_eq!(plan.state(), ArtifactState::Starting);

        assert!(runtime.complete_start("slow"));
        assert!(signal.await_completion(Duration::from_secs(5)).unwrap());
        assert_eq!(plan.state(), ArtifactState::Active);
    }

    #[test]
    fn test_aborted_child_aborts_plan() {
        let (runtime, lifecycle) = setup();
        runtime.set_activation("m", Activation::Abort);
        let plan = artifact(ArtifactDescriptor::plan("p", "1.0.0", false));
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));
        lifecycle.install(&module).unwrap();
        lifecycle.install(&plan).unwrap();
        let tree = ArtifactTree {
            artifact: plan.clone(),
            children: vec![leaf(&module)],
        };

        let signal = Arc::new(BlockingSignal::new(true));
        lifecycle.start(&tree, signal.clone()).unwrap();
        assert!(!signal.await_completion(Duration::from_secs(5)).unwrap());
        assert!(signal.is_aborted());
        assert_eq!(plan.state(), ArtifactState::Resolved);
    }

    #[test]
    fn test_refresh_keeps_state_and_updates_runtime() {
        let (runtime, lifecycle) = setup();
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));
        lifecycle.install(&module).unwrap();
        assert!(start_and_wait(&lifecycle, &leaf(&module)).unwrap());

        let updated = ArtifactDescriptor::module("m", "1.0.0").with_property("k", "v");
        lifecycle.refresh(&module, updated).unwrap();
        assert_eq!(module.state(), ArtifactState::Active);
        let module_id = module.module_id().unwrap();
        assert_eq!(runtime.descriptor(module_id).unwrap().properties["k"], "v");
    }

    #[test]
    fn test_refresh_rejects_identity_change() {
        let (_runtime, lifecycle) = setup();
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));
        lifecycle.install(&module).unwrap();
        assert!(lifecycle
            .refresh(&module, ArtifactDescriptor::module("m", "2.0.0"))
            .is_err());
        assert_eq!(module.descriptor().version, "1.0.0");
    }

    #[test]
    fn test_failed_refresh_restores_descriptor() {
        let (runtime, lifecycle) = setup();
        runtime.fail_update("m", "bad manifest");
        let module = artifact(ArtifactDescriptor::module("m", "1.0.0"));
        lifecycle.install(&module).unwrap();

        let updated = ArtifactDescriptor::module("m", "1.0.0").with_property("k", "v");
        assert!(lifecycle.refresh(&module, updated).is_err());
        assert!(module.descriptor().properties.is_empty());
        assert_eq!(module.state(), ArtifactState::Installed);
    }
}
