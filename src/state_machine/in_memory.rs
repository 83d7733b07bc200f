//! # In-Memory Module Runtime
//!
//! Reference [`ModuleRuntime`] that keeps modules in memory and activates them on
//! a background worker thread. Activation behaviour is configurable per module
//! name, which makes it the runtime of choice for embedding the deployer in tests
//! and tools that do not host real modules.

use super::events::{ModuleEvent, ModuleId};
use super::runtime::{ModuleListener, ModuleRuntime, ModuleRuntimeError, ModuleRuntimeResult};
use crate::artifact::{ArtifactDescriptor, ArtifactType, Location};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How a module behaves when started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Becomes active as soon as the worker picks it up
    Immediate,
    /// Becomes active after the given delay
    Delayed(Duration),
    /// Activation fails with the given reason
    Fail(String),
    /// Activation is abandoned: the module stops while starting
    Abort,
    /// Stays starting until completed through the runtime handle
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Installed,
    Resolved,
    Starting,
    Active,
}

#[derive(Debug, Clone)]
struct ModuleRecord {
    name: String,
    artifact_type: ArtifactType,
    status: ModuleStatus,
    descriptor: ArtifactDescriptor,
}

#[derive(Debug)]
enum JobOutcome {
    Start,
    Fail(String),
    Abort,
}

#[derive(Debug)]
struct ActivationJob {
    module: ModuleId,
    due: Instant,
    outcome: JobOutcome,
}

#[derive(Default)]
struct Shared {
    modules: RwLock<HashMap<ModuleId, ModuleRecord>>,
    listeners: RwLock<Vec<Arc<dyn ModuleListener>>>,
}

impl Shared {
    /// Deliver an event to every listener; a failing listener never stops delivery
    fn dispatch(&self, module: ModuleId, event: ModuleEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| listener.module_changed(module, &event)));
            match delivered {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    module = %module,
                    event = event.event_type(),
                    error = %err,
                    "Module listener failed"
                ),
                Err(_) => warn!(
                    module = %module,
                    event = event.event_type(),
                    "Module listener panicked"
                ),
            }
        }
    }

    /// Atomically move `module` from `from` to `to`
    fn transition(&self, module: ModuleId, from: ModuleStatus, to: ModuleStatus) -> bool {
        let mut modules = self.modules.write();
        match modules.get_mut(&module) {
            Some(record) if record.status == from => {
                record.status = to;
                true
            }
            _ => false,
        }
    }

    fn complete(&self, job: ActivationJob) {
        match job.outcome {
            JobOutcome::Start => {
                if self.transition(job.module, ModuleStatus::Starting, ModuleStatus::Active) {
                    self.dispatch(job.module, ModuleEvent::Started);
                }
            }
            JobOutcome::Fail(reason) => {
                if self.transition(job.module, ModuleStatus::Starting, ModuleStatus::Resolved) {
                    self.dispatch(job.module, ModuleEvent::StartFailed(reason));
                }
            }
            JobOutcome::Abort => {
                if self.transition(job.module, ModuleStatus::Starting, ModuleStatus::Resolved) {
                    self.dispatch(job.module, ModuleEvent::Stopping);
                    self.dispatch(job.module, ModuleEvent::Stopped);
                }
            }
        }
    }
}

fn run_activation_worker(shared: Arc<Shared>, jobs: Receiver<ActivationJob>) {
    let mut pending: Vec<ActivationJob> = Vec::new();
    loop {
        let received = match pending.iter().map(|job| job.due).min() {
            Some(due) => jobs.recv_timeout(due.saturating_duration_since(Instant::now())),
            None => jobs.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(job) => pending.push(job),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = pending.drain(..).partition(|job| job.due <= now);
        pending = waiting;
        for job in due {
            shared.complete(job);
        }
    }
    debug!(abandoned = pending.len(), "Activation worker stopped");
}

pub struct InMemoryModuleRuntime {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    jobs: Sender<ActivationJob>,
    activations: DashMap<String, Activation>,
    install_failures: DashMap<String, String>,
    update_failures: DashMap<String, String>,
    start_calls: DashMap<String, usize>,
}

impl InMemoryModuleRuntime {
    pub fn new() -> Self {
        let shared = Arc::new(Shared::default());
        let (jobs, receiver) = channel::unbounded();
        let worker_shared = Arc::clone(&shared);
        thread::spawn(move || run_activation_worker(worker_shared, receiver));

        Self {
            shared,
            next_id: AtomicU64::new(1),
            jobs,
            activations: DashMap::new(),
            install_failures: DashMap::new(),
            update_failures: DashMap::new(),
            start_calls: DashMap::new(),
        }
    }

    /// Configure how modules with this name activate (default: immediately)
    pub fn set_activation(&self, name: impl Into<String>, activation: Activation) {
        self.activations.insert(name.into(), activation);
    }

    pub fn fail_install(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.install_failures.insert(name.into(), reason.into());
    }

    pub fn fail_update(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.update_failures.insert(name.into(), reason.into());
    }

    /// Finish a [`Activation::Manual`] start successfully
    pub fn complete_start(&self, name: &str) -> bool {
        self.finish_manual(name, JobOutcome::Start)
    }

    pub fn fail_start(&self, name: &str, reason: impl Into<String>) -> bool {
        self.finish_manual(name, JobOutcome::Fail(reason.into()))
    }

    pub fn abort_start(&self, name: &str) -> bool {
        self.finish_manual(name, JobOutcome::Abort)
    }

    fn finish_manual(&self, name: &str, outcome: JobOutcome) -> bool {
        let starting = self.shared.modules.read().iter().find_map(|(id, record)| {
            (record.name == name && record.status == ModuleStatus::Starting).then_some(*id)
        });
        match starting {
            Some(module) => {
                self.shared.complete(ActivationJob {
                    module,
                    due: Instant::now(),
                    outcome,
                });
                true
            }
            None => false,
        }
    }

    /// Module ids installed under this name
    pub fn modules_named(&self, name: &str) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self
            .shared
            .modules
            .read()
            .iter()
            .filter(|(_, record)| record.name == name)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn status(&self, name: &str) -> Option<ModuleStatus> {
        let modules = self.shared.modules.read();
        modules
            .values()
            .find(|record| record.name == name)
            .map(|record| record.status)
    }

    pub fn descriptor(&self, module: ModuleId) -> Option<ArtifactDescriptor> {
        self.shared
            .modules
            .read()
            .get(&module)
            .map(|record| record.descriptor.clone())
    }

    pub fn installed_count(&self) -> usize {
        self.shared.modules.read().len()
    }

    /// Number of times `start` initiated activation of modules with this name
    pub fn start_count(&self, name: &str) -> usize {
        self.start_calls.get(name).map(|count| *count).unwrap_or(0)
    }

    fn record(&self, module: ModuleId) -> ModuleRuntimeResult<ModuleRecord> {
        self.shared
            .modules
            .read()
            .get(&module)
            .cloned()
            .ok_or(ModuleRuntimeError::UnknownModule(module))
    }
}

impl Default for InMemoryModuleRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRuntime for InMemoryModuleRuntime {
    fn install(
        &self,
        descriptor: &ArtifactDescriptor,
        location: &Location,
    ) -> ModuleRuntimeResult<ModuleId> {
        if let Some(reason) = self.install_failures.get(&descriptor.name) {
            return Err(ModuleRuntimeError::InstallFailed {
                name: descriptor.name.clone(),
                reason: reason.clone(),
            });
        }

        let module = ModuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.modules.write().insert(
            module,
            ModuleRecord {
                name: descriptor.name.clone(),
                artifact_type: descriptor.artifact_type,
                status: ModuleStatus::Installed,
                descriptor: descriptor.clone(),
            },
        );
        debug!(module = %module, name = %descriptor.name, location = %location, "Module installed");
        Ok(module)
    }

    fn start(&self, module: ModuleId) -> ModuleRuntimeResult<()> {
        let record = self.record(module)?;
        if !record.artifact_type.can_activate() {
            return Err(ModuleRuntimeError::Rejected {
                module,
                operation: "start",
                reason: format!("{} modules cannot be started", record.artifact_type),
            });
        }

        let previous = {
            let mut modules = self.shared.modules.write();
            let record = modules
                .get_mut(&module)
                .ok_or(ModuleRuntimeError::UnknownModule(module))?;
            match record.status {
                ModuleStatus::Active | ModuleStatus::Starting => return Ok(()),
                previous => {
                    record.status = ModuleStatus::Starting;
                    previous
                }
            }
        };

        if previous == ModuleStatus::Installed {
            self.shared.dispatch(module, ModuleEvent::Resolved);
        }
        self.shared.dispatch(module, ModuleEvent::Starting);
        *self.start_calls.entry(record.name.clone()).or_insert(0) += 1;

        let activation = self
            .activations
            .get(&record.name)
            .map(|activation| activation.clone())
            .unwrap_or(Activation::Immediate);
        let now = Instant::now();
        let job = match activation {
            Activation::Immediate => Some((JobOutcome::Start, now)),
            Activation::Delayed(delay) => Some((JobOutcome::Start, now + delay)),
            Activation::Fail(reason) => Some((JobOutcome::Fail(reason), now)),
            Activation::Abort => Some((JobOutcome::Abort, now)),
            Activation::Manual => None,
        };

        if let Some((outcome, due)) = job {
            self.jobs
                .send(ActivationJob {
                    module,
                    due,
                    outcome,
                })
                .map_err(|_| ModuleRuntimeError::Rejected {
                    module,
                    operation: "start",
                    reason: "activation worker is not running".to_string(),
                })?;
        }
        Ok(())
    }

    fn stop(&self, module: ModuleId) -> ModuleRuntimeResult<()> {
        let was_running = {
            let mut modules = self.shared.modules.write();
            let record = modules
                .get_mut(&module)
                .ok_or(ModuleRuntimeError::UnknownModule(module))?;
            match record.status {
                ModuleStatus::Active | ModuleStatus::Starting => {
                    record.status = ModuleStatus::Resolved;
                    true
                }
                _ => false,
            }
        };

        if was_running {
            self.shared.dispatch(module, ModuleEvent::Stopping);
            self.shared.dispatch(module, ModuleEvent::Stopped);
        }
        Ok(())
    }

    fn uninstall(&self, module: ModuleId) -> ModuleRuntimeResult<()> {
        let record = self
            .shared
            .modules
            .write()
            .remove(&module)
            .ok_or(ModuleRuntimeError::UnknownModule(module))?;

        if matches!(record.status, ModuleStatus::Active | ModuleStatus::Starting) {
            self.shared.dispatch(module, ModuleEvent::Stopping);
            self.shared.dispatch(module, ModuleEvent::Stopped);
        }
        if record.status != ModuleStatus::Installed {
            self.shared.dispatch(module, ModuleEvent::Unresolved);
        }
        self.shared.dispatch(module, ModuleEvent::Uninstalled);
        debug!(module = %module, name = %record.name, "Module uninstalled");
        Ok(())
    }

    fn update(&self, module: ModuleId, descriptor: &ArtifactDescriptor) -> ModuleRuntimeResult<()> {
        if let Some(reason) = self.update_failures.get(&descriptor.name) {
            return Err(ModuleRuntimeError::UpdateFailed {
                module,
                reason: reason.clone(),
            });
        }

        let status = {
            let mut modules = self.shared.modules.write();
            let record = modules
                .get_mut(&module)
                .ok_or(ModuleRuntimeError::UnknownModule(module))?;
            record.descriptor = descriptor.clone();
            record.status
        };

        let events: &[ModuleEvent] = match status {
            ModuleStatus::Active => &[
                ModuleEvent::Stopping,
                ModuleEvent::Stopped,
                ModuleEvent::Unresolved,
                ModuleEvent::Resolved,
                ModuleEvent::Starting,
                ModuleEvent::Started,
            ],
            ModuleStatus::Resolved => &[ModuleEvent::Unresolved, ModuleEvent::Resolved],
            ModuleStatus::Installed | ModuleStatus::Starting => &[],
        };
        for event in events {
            self.shared.dispatch(module, event.clone());
        }
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn ModuleListener>) {
        self.shared.listeners.write().push(listener);
    }
}
