//! # Application Deployer
//!
//! Top-level orchestration of install, start, stop, refresh and removal of
//! deployed artifacts.
//!
//! ## Overview
//!
//! The deployer owns the install graph, the registry of deployed top-level
//! artifacts and the recovery log, all behind one structural lock. Every
//! operation that changes the graph holds the lock for its structural phase;
//! waiting for asynchronous activation happens after the lock is released so a
//! slow module never blocks other deployments.
//!
//! ## Installing
//!
//! A new top-level artifact is either promoted from a node already in the graph
//! (an earlier deployment pulled it in as a dependency) or built from scratch:
//! plan members are constructed, then the [`Pipeline`] runs scoping, import and
//! dependency expansion, validation and finally installs every node into the
//! module runtime. A failure at any point rolls back exactly the nodes the
//! install created, leaving shared nodes untouched.
//!
//! ## Removing
//!
//! Undeploying drops the artifact's root. Nodes that are no longer reachable
//! from any root are stopped, uninstalled and removed; nodes still reachable
//! through another deployment stay as they are.

use super::builder::GraphBuilder;
use super::options::DeploymentOptions;
use super::recovery::RecoveryLog;
use super::registry::{RegistryEntry, RuntimeArtifactRegistry};
use super::source::ArtifactSource;
use crate::artifact::{
    ArtifactDescriptor, ArtifactIdentity, ArtifactType, DeploymentIdentity, InstallArtifact,
    Location, Version,
};
use crate::config::DeployerConfig;
use crate::constants::{events, properties};
use crate::error::{DeploymentError, Result};
use crate::events::EventLog;
use crate::graph::{InstallGraph, NodeId, SharedNodeLocator, VisitOutcome};
use crate::logging::{log_deployment_operation, log_error};
use crate::pipeline::{
    ImportExpander, InstallEnvironment, NoImportExpansion, Pipeline, PipelineStage,
};
use crate::signal::{BlockingSignal, NoopSignal};
use crate::state_machine::{ArtifactLifecycle, ArtifactState, ModuleRuntime};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default)]
struct DeployerState {
    graph: InstallGraph,
    registry: RuntimeArtifactRegistry,
    recovery_log: RecoveryLog,
}

pub struct ApplicationDeployer {
    state: Mutex<DeployerState>,
    lifecycle: ArtifactLifecycle,
    source: Arc<dyn ArtifactSource>,
    pipeline: Pipeline,
    import_expander: Arc<dyn ImportExpander>,
    event_log: EventLog,
    start_timeout: Duration,
    synchronous_by_default: bool,
}

impl ApplicationDeployer {
    pub fn new(
        runtime: Arc<dyn ModuleRuntime>,
        source: Arc<dyn ArtifactSource>,
        config: &DeployerConfig,
    ) -> Self {
        let event_log = EventLog::new(config.events.capacity);
        Self {
            state: Mutex::new(DeployerState::default()),
            lifecycle: ArtifactLifecycle::new(runtime, event_log.clone()),
            source,
            pipeline: Pipeline::standard(),
            import_expander: Arc::new(NoImportExpansion),
            event_log,
            start_timeout: config.start_timeout(),
            synchronous_by_default: config.deployer.synchronous_by_default,
        }
    }

    pub fn with_import_expander(mut self, import_expander: Arc<dyn ImportExpander>) -> Self {
        self.import_expander = import_expander;
        self
    }

    /// Replace the install pipeline
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Override the configured wait for synchronous starts; zero waits without limit
    pub fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn lifecycle(&self) -> &ArtifactLifecycle {
        &self.lifecycle
    }

    /// Options applied when a caller has no preference
    pub fn default_options(&self) -> DeploymentOptions {
        DeploymentOptions {
            synchronous: self.synchronous_by_default,
            ..DeploymentOptions::default()
        }
    }

    /// Install the artifact at `location` without starting it.
    ///
    /// Installing a location that is already deployed with the same identity is
    /// a no-op returning the existing identity.
    #[instrument(skip(self))]
    pub fn install(
        &self,
        location: &Location,
        options: DeploymentOptions,
    ) -> Result<DeploymentIdentity> {
        if !self.source.supports(location) {
            return Err(DeploymentError::UnsupportedLocationScheme {
                scheme: location.scheme().to_string(),
                location: location.to_string(),
            });
        }
        let descriptor = self.source.read_descriptor(location)?;
        let identity = descriptor
            .identity(&location.to_string())?
            .with_scope(descriptor.scope_name());
        let deployment_identity = identity.deployment_identity();

        let mut state = self.state.lock();
        if let Some(existing) = state.registry.check(&deployment_identity, location)? {
            debug!(identity = %existing, "Location already deployed");
            return Ok(existing);
        }

        log_deployment_operation(
            "install",
            Some(&deployment_identity.to_string()),
            Some(&location.to_string()),
            "started",
            None,
        );

        let node = match SharedNodeLocator::find_identity(&state.graph, &identity) {
            Some(shared) => {
                info!(
                    identity = %identity,
                    node = %shared,
                    "Promoting installed dependency to top-level deployment"
                );
                state.graph.add_root(shared);
                shared
            }
            None => self.install_new(&mut state.graph, identity, location.clone(), descriptor)?,
        };

        let entry = RegistryEntry {
            identity: deployment_identity.clone(),
            location: location.clone(),
            node,
            options,
        };
        if let Err(err) = state.registry.register(entry) {
            // Registration was checked under this lock
            state.graph.remove_root(node);
            return Err(err);
        }
        if options.recoverable {
            state.recovery_log.add(location.clone(), options);
        }

        log_deployment_operation(
            "install",
            Some(&deployment_identity.to_string()),
            Some(&location.to_string()),
            "completed",
            None,
        );
        Ok(deployment_identity)
    }

    fn install_new(
        &self,
        graph: &mut InstallGraph,
        identity: ArtifactIdentity,
        location: Location,
        descriptor: ArtifactDescriptor,
    ) -> Result<NodeId> {
        let mut env = InstallEnvironment::new(
            &self.event_log,
            self.source.as_ref(),
            &self.lifecycle,
            self.import_expander.as_ref(),
        );

        let result = GraphBuilder::build(graph, &mut env, identity.clone(), location, descriptor)
            .and_then(|root| {
                self.pipeline.process(graph, root, &mut env)?;
                Ok(root)
            });

        match result {
            Ok(root) => {
                graph.add_root(root);
                Ok(root)
            }
            Err(err) => {
                let ledger = env.into_ledger();
                warn!(
                    identity = %identity,
                    owned = ledger.owned().len(),
                    shared_edges = ledger.shared_edges().len(),
                    error = %err,
                    "Install failed, rolling back"
                );
                ledger.rollback(graph, &self.lifecycle);
                self.event_log.log(
                    events::INSTALL_FAILED,
                    &identity,
                    json!({ "reason": err.to_string() }),
                );
                Err(err)
            }
        }
    }

    /// Install and start the artifact at `location`.
    ///
    /// A synchronous deploy waits up to the start timeout. Running out of time
    /// or being aborted is reported through the event log and is not an error;
    /// a start failure undeploys the artifact and returns the cause.
    #[instrument(skip(self))]
    pub fn deploy(
        &self,
        location: &Location,
        options: DeploymentOptions,
    ) -> Result<DeploymentIdentity> {
        let identity = self.install(location, options)?;
        if let Err(err) = self.start(&identity, options.synchronous) {
            log_error("deployer", "deploy", &err.to_string(), Some(&identity.to_string()));
            if let Err(rollback) = self.undeploy(&identity, true) {
                warn!(
                    identity = %identity,
                    error = %rollback,
                    "Rollback of failed deployment incomplete"
                );
            }
            return Err(err);
        }
        Ok(identity)
    }

    fn start(&self, identity: &DeploymentIdentity, synchronous: bool) -> Result<()> {
        let tree = {
            let state = self.state.lock();
            state
                .registry
                .get(identity)
                .and_then(|entry| state.graph.tree(entry.node))
                .ok_or_else(|| DeploymentError::ArtifactNotFound(identity.to_string()))?
        };

        if !synchronous {
            return self.lifecycle.start(&tree, Arc::new(NoopSignal));
        }

        let signal = Arc::new(BlockingSignal::new(true));
        self.lifecycle.start(&tree, signal.clone())?;
        let completed = if self.start_timeout.is_zero() {
            signal.check_complete()?
        } else {
            signal.await_completion(self.start_timeout)?
        };

        if !completed {
            if signal.is_aborted() {
                self.event_log.log(events::START_ABORTED, identity, json!({}));
            } else {
                self.event_log.log(
                    events::START_TIMED_OUT,
                    identity,
                    json!({ "timeout_ms": self.start_timeout.as_millis() as u64 }),
                );
            }
        }
        Ok(())
    }

    /// Remove a deployed artifact.
    ///
    /// `deleted` says the backing file is already gone, so a deployer-owned
    /// file is not deleted again. Nodes still used by other deployments are
    /// kept. Every unreachable node is processed even when one fails; the first
    /// uninstall failure is returned.
    #[instrument(skip(self))]
    pub fn undeploy(&self, identity: &DeploymentIdentity, deleted: bool) -> Result<()> {
        let mut state = self.state.lock();
        let Some(entry) = state.registry.unregister(identity) else {
            self.event_log.log(
                events::ARTIFACT_NOT_FOUND,
                identity,
                json!({ "operation": "undeploy" }),
            );
            return Err(DeploymentError::ArtifactNotFound(identity.to_string()));
        };
        state.recovery_log.remove(&entry.location);

        let subgraph = state.graph.subgraph(entry.node);
        state.graph.remove_root(entry.node);
        let doomed = state.graph.collect_unreachable();

        for node in subgraph.iter().filter(|node| !doomed.contains(node)) {
            if let Some(artifact) = state.graph.artifact(*node) {
                self.event_log.log(
                    events::STILL_REFERENCED,
                    artifact.identity(),
                    json!({ "undeployed": identity.to_string() }),
                );
            }
        }

        let artifacts: Vec<Arc<InstallArtifact>> = doomed
            .iter()
            .filter_map(|node| state.graph.artifact(*node).cloned())
            .collect();
        for artifact in &artifacts {
            if let Err(err) = self.lifecycle.stop(artifact) {
                warn!(artifact = %artifact.identity(), error = %err, "Stop failed during undeploy");
            }
        }

        let mut first_error = None;
        for artifact in &artifacts {
            if let Err(err) = self.lifecycle.uninstall(artifact) {
                first_error.get_or_insert(err);
            }
        }
        for node in &doomed {
            if let Err(err) = state.graph.remove_node(*node) {
                warn!(node = %node, error = %err, "Unable to remove node");
            }
        }
        drop(state);

        if entry.options.deployer_owned && !deleted {
            if let Err(err) = self.source.delete(&entry.location) {
                self.event_log.log(
                    events::BACKING_FILE_DELETE_FAILED,
                    identity,
                    json!({ "location": entry.location.to_string(), "reason": err.to_string() }),
                );
            }
        }

        log_deployment_operation(
            "undeploy",
            Some(&identity.to_string()),
            Some(&entry.location.to_string()),
            if first_error.is_some() { "failed" } else { "completed" },
            None,
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Pick up new content for the artifact `name` within the deployment at
    /// `location`.
    ///
    /// The artifact is updated in place when it can be; a member of a scoped
    /// plan is refreshed together with its whole scope. When an in-place
    /// refresh is not possible the deployment is undeployed and deployed again
    /// with its original options.
    #[instrument(skip(self))]
    pub fn refresh(&self, location: &Location, name: &str) -> Result<DeploymentIdentity> {
        let entry = self
            .state
            .lock()
            .registry
            .find_by_location(location)
            .cloned();
        let Some(entry) = entry else {
            self.event_log.log(
                events::ARTIFACT_NOT_FOUND,
                location,
                json!({ "operation": "refresh", "name": name }),
            );
            return Err(DeploymentError::ArtifactNotFound(location.to_string()));
        };

        let outcome = {
            let state = self.state.lock();
            let (target, origin) = self.refresh_target(&state.graph, &entry, name)?;
            self.refresh_node(&state.graph, target, &origin)
        };

        match outcome {
            Ok(()) => Ok(entry.identity),
            Err(err) => {
                self.event_log.log(
                    events::REDEPLOY_ESCALATED,
                    &entry.identity,
                    json!({ "reason": err.to_string() }),
                );
                self.undeploy(&entry.identity, true)?;
                self.deploy(location, entry.options)
            }
        }
    }

    /// Node to refresh for `name`, plus the origin marking nodes this deployment owns
    fn refresh_target(
        &self,
        graph: &InstallGraph,
        entry: &RegistryEntry,
        name: &str,
    ) -> Result<(NodeId, String)> {
        let root = graph
            .artifact(entry.node)
            .ok_or_else(|| DeploymentError::ArtifactNotFound(entry.identity.to_string()))?;
        let origin = root.identity().to_string();
        if root.name() == name {
            return Ok((entry.node, origin));
        }

        let target = graph
            .subgraph(entry.node)
            .into_iter()
            .find(|node| {
                graph.artifact(*node).is_some_and(|artifact| {
                    artifact.name() == name
                        && artifact.property(properties::ORIGIN).as_deref() == Some(origin.as_str())
                })
            })
            .ok_or_else(|| {
                self.event_log.log(
                    events::ARTIFACT_NOT_FOUND,
                    &entry.identity,
                    json!({ "operation": "refresh", "name": name }),
                );
                DeploymentError::ArtifactNotFound(format!("{name} in {}", entry.identity))
            })?;

        // Members of a scope are refreshed with the plan that created it
        let scope = graph
            .artifact(target)
            .and_then(|artifact| artifact.scope_name().map(str::to_string));
        let target = match scope {
            Some(scope) => self.scope_plan(graph, entry.node, &scope),
            None => target,
        };
        Ok((target, origin))
    }

    /// The plan that created `scope` within the subgraph at `root`
    fn scope_plan(&self, graph: &InstallGraph, root: NodeId, scope: &str) -> NodeId {
        graph
            .subgraph(root)
            .into_iter()
            .find(|node| {
                graph.artifact(*node).is_some_and(|artifact| {
                    artifact.artifact_type().is_composite()
                        && artifact.descriptor().scope_name().as_deref() == Some(scope)
                })
            })
            .unwrap_or(root)
    }

    fn refresh_node(&self, graph: &InstallGraph, node: NodeId, origin: &str) -> Result<()> {
        let artifact = graph
            .artifact(node)
            .cloned()
            .ok_or_else(|| DeploymentError::general(format!("Unknown graph node {node}")))?;
        let descriptor = self.source.read_descriptor(artifact.location())?;

        if !artifact.artifact_type().is_composite() {
            return self.lifecycle.refresh(&artifact, descriptor);
        }

        if descriptor.children != artifact.descriptor().children {
            return Err(DeploymentError::general(format!(
                "Members of {} changed",
                artifact.identity()
            )));
        }
        self.lifecycle.refresh(&artifact, descriptor)?;
        for child in graph.children(node) {
            let owned_here = graph
                .artifact(*child)
                .is_some_and(|child| child.property(properties::ORIGIN).as_deref() == Some(origin));
            if owned_here {
                self.refresh_node(graph, *child, origin)?;
            }
        }
        Ok(())
    }

    /// Refresh a single deployed module by name and version.
    ///
    /// The deployment that owns the module decides how the refresh is carried
    /// out, as for [`ApplicationDeployer::refresh`].
    #[instrument(skip(self))]
    pub fn refresh_module(&self, name: &str, version: &str) -> Result<DeploymentIdentity> {
        let version: Version = version
            .parse()
            .map_err(|reason: String| DeploymentError::IdentityIndeterminate {
                location: name.to_string(),
                reason,
            })?;

        let location = {
            let state = self.state.lock();
            let graph = &state.graph;
            let mut found = None;
            graph.visit_from_roots(|id, node| {
                let identity = node.artifact().identity();
                if identity.artifact_type == ArtifactType::Module
                    && identity.name == name
                    && identity.version == version
                {
                    found = Some((id, node.artifact().property(properties::ORIGIN)));
                    VisitOutcome::Stop
                } else {
                    VisitOutcome::Continue
                }
            });

            found.and_then(|(module, origin)| {
                let owners: Vec<&RegistryEntry> = state
                    .registry
                    .identities()
                    .iter()
                    .filter_map(|identity| state.registry.get(identity))
                    .filter(|entry| graph.subgraph(entry.node).contains(&module))
                    .collect();
                owners
                    .iter()
                    .find(|entry| {
                        graph.artifact(entry.node).map(|a| a.identity().to_string()) == origin
                    })
                    .or_else(|| owners.first())
                    .map(|entry| entry.location.clone())
            })
        };

        match location {
            Some(location) => self.refresh(&location, name),
            None => {
                let target = format!("module:{name}:{version}");
                self.event_log.log(
                    events::ARTIFACT_NOT_FOUND,
                    &target,
                    json!({ "operation": "refresh_module" }),
                );
                Err(DeploymentError::ArtifactNotFound(target))
            }
        }
    }

    /// Re-establish a deployment recorded before a restart.
    ///
    /// A deployer-owned location whose file has gone is dropped from the
    /// recovery log and `None` returned. Recovered deployments start without
    /// waiting.
    #[instrument(skip(self))]
    pub fn recover_deployment(
        &self,
        location: &Location,
        options: DeploymentOptions,
    ) -> Result<Option<DeploymentIdentity>> {
        if options.deployer_owned && !self.source.exists(location) {
            self.state.lock().recovery_log.remove(location);
            self.event_log.log(
                events::RECOVERY_DROPPED,
                location,
                json!({ "reason": "backing file missing" }),
            );
            return Ok(None);
        }

        let identity = self.install(location, options)?;
        self.start(&identity, false)?;
        Ok(Some(identity))
    }

    /// Recover every entry of `log`, skipping entries that fail
    pub fn recover_from(&self, log: &RecoveryLog) -> Vec<DeploymentIdentity> {
        log.entries()
            .iter()
            .filter_map(|entry| {
                match self.recover_deployment(&entry.location, entry.options) {
                    Ok(identity) => identity,
                    Err(err) => {
                        log_error(
                            "deployer",
                            "recover",
                            &err.to_string(),
                            Some(&entry.location.to_string()),
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Snapshot of the recovery log, for persisting across restarts
    pub fn recovery_log(&self) -> RecoveryLog {
        self.state.lock().recovery_log.clone()
    }

    pub fn is_deployed(&self, location: &Location) -> bool {
        self.state.lock().registry.find_by_location(location).is_some()
    }

    pub fn deployment_identity(&self, location: &Location) -> Option<DeploymentIdentity> {
        self.state
            .lock()
            .registry
            .find_by_location(location)
            .map(|entry| entry.identity.clone())
    }

    /// Identities of every deployed top-level artifact
    pub fn deployment_identities(&self) -> Vec<DeploymentIdentity> {
        self.state.lock().registry.identities()
    }

    /// Externally visible state of a deployed top-level artifact
    pub fn state_of(&self, identity: &DeploymentIdentity) -> Option<ArtifactState> {
        let state = self.state.lock();
        let entry = state.registry.get(identity)?;
        state.graph.artifact(entry.node).map(|a| a.external_state())
    }

    /// Identities of every artifact in the graph, top-level or not
    pub fn installed_artifacts(&self) -> Vec<ArtifactIdentity> {
        let state = self.state.lock();
        let mut identities: Vec<ArtifactIdentity> = state
            .graph
            .node_ids()
            .filter_map(|id| state.graph.artifact(id).map(|a| a.identity().clone()))
            .collect();
        identities.sort_by_key(|identity| identity.to_string());
        identities
    }
}

impl std::fmt::Debug for ApplicationDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ApplicationDeployer")
            .field("deployments", &state.registry.len())
            .field("nodes", &state.graph.len())
            .field("pipeline", &self.pipeline.stage_descriptions())
            .field("start_timeout", &self.start_timeout)
            .finish()
    }
}
