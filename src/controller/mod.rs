//! The controller: supervises the module set, drives routing, retains the
//! bounded history buffer, and serves the control-plane operations of §6.
//! Grounded in `swarmclone/controller.py`'s `Controller` (module map keyed
//! by role, `register`/`start`/`handle_message`/`handle_module`), redesigned
//! per §9 to take an explicit [`Registry`] rather than relying on metaclass
//! registration, and to use `tokio`'s scheduler rather than a bespoke
//! asyncio loop.

pub mod api;
mod history;
mod router;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use api::{
    ApiInjectRequest, Getter, HistoryEntry, ModuleSelector, StartOutcome, StartRequest, StartupParamEntry,
    StatusEntry, VersionInfo,
};

use crate::error::{Error, Result};
use crate::message::{self, Message, MessageRef, Role};
use crate::module::{resolve, ModuleHandle, ModuleInstance, Registry, QUEUE_CAPACITY};

use history::History;

#[derive(Default)]
struct Inner {
    modules: HashMap<Role, Vec<ModuleInstance>>,
    history: History,
}

/// Cheaply `Clone`able handle to the controller's shared state — every
/// clone refers to the same running system, mirroring the
/// `Orchestrator`/`OrchestratorHandle` split the teacher uses, collapsed
/// into a single type since the control-plane surface here is a set of
/// async methods rather than a command/event channel pair.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Mutex<Inner>>,
    registry: Arc<Registry>,
}

impl Controller {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                modules: HashMap::new(),
                history: History::new(),
            })),
            registry: Arc::new(registry),
        }
    }

    pub fn get_version(&self) -> VersionInfo {
        VersionInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn startup_param(&self) -> Vec<StartupParamEntry> {
        let mut entries = Vec::new();
        for role in self.registry.roles() {
            for factory in self.registry.by_role(role) {
                entries.push(StartupParamEntry {
                    role,
                    module_name: factory.type_name().to_string(),
                    desc: factory.description().to_string(),
                    config: factory.config_schema(),
                });
            }
        }
        entries
    }

    pub async fn get_status(&self) -> Vec<StatusEntry> {
        let inner = self.inner.lock().await;
        let mut entries = Vec::new();
        for (role, instances) in inner.modules.iter() {
            for instance in instances {
                entries.push(StatusEntry {
                    role: *role,
                    module_name: instance.name().to_string(),
                    running: instance.is_running(),
                    loaded: true,
                    err: instance.error().map(|e| e.to_string()),
                });
            }
        }
        entries
    }

    /// Destructive drain of the history buffer (§9 Open Questions decision).
    pub async fn get_messages(&self) -> Vec<HistoryEntry> {
        let mut inner = self.inner.lock().await;
        inner.history.drain().iter().map(HistoryEntry::from).collect()
    }

    /// `api` synthetic event injection (§6): behaves as if a real
    /// recognizer had produced these, without requiring a live `DummyAsr`
    /// (or any ASR module at all) to be attached.
    pub async fn api_inject_asr(&self, req: ApiInjectRequest) {
        let source = MessageRef::new(Role::Asr, "api");
        self.route(message::asr_activated(source.clone())).await;
        self.route(message::asr_message(source, req.speaker_name, req.message))
            .await;
    }

    /// Stop everything currently running, clear state, instantiate and
    /// start the selected modules (§4.2, §6).
    pub async fn start(&self, req: StartRequest) -> StartOutcome {
        self.stop().await;

        let unknown: Vec<ModuleSelector> = req
            .selected
            .iter()
            .filter(|sel| self.registry.get(sel.role, &sel.type_name).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return StartOutcome::UnknownModules(unknown);
        }

        let llm_count = req.selected.iter().filter(|sel| sel.role == Role::Llm).count();
        if llm_count > 1 {
            return StartOutcome::ConfigConflict("at most one LLM module may be selected".to_string());
        }

        let mut built: Vec<ModuleInstance> = Vec::new();
        for selector in &req.selected {
            let factory = self.registry.get(selector.role, &selector.type_name).expect("checked above");
            let empty = HashMap::new();
            let supplied = req.cfg.get(selector).unwrap_or(&empty);
            let fields = match resolve(&factory.config_schema(), supplied) {
                Ok(f) => f,
                Err(e) => {
                    return StartOutcome::ConstructionFailed {
                        selector: selector.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            let module = match factory.construct(&fields) {
                Ok(m) => m,
                Err(e) => {
                    return StartOutcome::ConstructionFailed {
                        selector: selector.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            built.push(self.attach(selector.role, module));
        }

        let mut inner = self.inner.lock().await;
        for instance in built {
            inner.modules.entry(instance.role()).or_default().push(instance);
        }
        info!(count = req.selected.len(), "started modules");
        StartOutcome::Ok
    }

    /// Cancel every module and handler task, wait for them to observe it,
    /// clear the history buffer (§4.2 Stop semantics).
    pub async fn stop(&self) {
        let modules: Vec<ModuleInstance> = {
            let mut inner = self.inner.lock().await;
            let modules: Vec<ModuleInstance> = inner.modules.drain().flat_map(|(_, v)| v).collect();
            inner.history.clear();
            modules
        };
        for instance in modules {
            instance.cancel_and_join().await;
        }
    }

    /// Construct the channel pair, spawn the module's `run` task and its
    /// handler task (§4.2 Supervision), and return the instance handle the
    /// router will deliver into.
    fn attach(&self, role: Role, mut module: Box<dyn crate::module::Module>) -> ModuleInstance {
        let name = module.name().to_string();
        let (task_tx, task_rx) = mpsc::channel::<Message>(QUEUE_CAPACITY);
        let (results_tx, mut results_rx) = mpsc::channel::<Message>(QUEUE_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let error = Arc::new(SyncMutex::new(None));
        let cancel = CancellationToken::new();

        let module_cancel = cancel.clone();
        let module_running = running.clone();
        let module_error = error.clone();
        let module_name = name.clone();
        let module_task: JoinHandle<()> = tokio::spawn(async move {
            let handle = ModuleHandle { task_rx, results_tx };
            let result = module.run(handle, module_cancel).await;
            module_running.store(false, std::sync::atomic::Ordering::SeqCst);
            if let Err(e) = result {
                error!(module = %module_name, error = %e, "module crashed");
                *module_error.lock() = Some(Error::module_crash(module_name.clone(), e));
            } else {
                debug!(module = %module_name, "module run completed");
            }
        });

        let handler_cancel = cancel.clone();
        let handler_controller = self.clone();
        let handler_name = name.clone();
        let handler_task: JoinHandle<()> = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = handler_cancel.cancelled() => {
                        debug!(module = %handler_name, "handler task cancelled");
                        return;
                    }
                    maybe_message = results_rx.recv() => {
                        match maybe_message {
                            Some(message) => handler_controller.route(message).await,
                            None => return,
                        }
                    }
                }
            }
        });

        ModuleInstance::new(name, role, task_tx, running, error, cancel, module_task, handler_task)
    }

    /// Route a message emitted by a module (or synthesized by the
    /// controller itself) to every live destination, recording it in the
    /// history buffer (§4.2 Routing algorithm).
    async fn route(&self, message: Message) {
        let mut inner = self.inner.lock().await;
        let delivered = router::deliver(&inner.modules, &message);
        debug!(message = message.name(), delivered, "routed message");
        inner.history.push(message);
    }
}
