//! The module contract (§4.1): a long-running cooperative task with a
//! bounded inbound `task_queue` and outbound `results_queue`, plus a
//! class-level reflective config schema. Concrete modules (ASR, LLM, TTS,
//! frontend, chat bridges) implement [`Module`]; their registrable classes
//! implement [`ModuleFactory`] so the controller can instantiate them by
//! name from a [`crate::module::registry::Registry`] without any
//! language-magic auto-registration (§9 "Registry as global mutable state").

pub mod config;
pub mod dummy;
pub mod instance;
pub mod registry;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::{Message, Role};

pub use config::{resolve, ConfigField, ConfigFieldKind, ConfigSchema, ConfigValue};
pub use instance::{ModuleInstance, QUEUE_CAPACITY};
pub use registry::Registry;

/// The two bounded channels a running module is wired to. `task_rx` is fed
/// by the router; `results_tx` is drained by the module's handler task into
/// the router (§4.2 Supervision).
pub struct ModuleHandle {
    pub task_rx: mpsc::Receiver<Message>,
    pub results_tx: mpsc::Sender<Message>,
}

impl ModuleHandle {
    /// Emit a message produced by this module. Never blocks indefinitely:
    /// the results queue is only ever read by this module's own handler
    /// task, so under normal operation this simply suspends until there is
    /// room.
    pub async fn emit(&self, message: Message) {
        let _ = self.results_tx.send(message).await;
    }
}

/// A live, running unit of work. Constructed by a [`ModuleFactory`] from
/// either a typed config object or a field map (§4.1's dual construction
/// path) — the trait itself only describes the running behavior.
#[async_trait]
pub trait Module: Send {
    fn name(&self) -> &str;
    fn role(&self) -> Role;

    /// Drive the module's cooperative loop until `cancel` fires or an
    /// unrecoverable error occurs. Implementations must observe `cancel` at
    /// every suspension point so `stop` terminates promptly (§4.2, §5).
    async fn run(&mut self, handle: ModuleHandle, cancel: CancellationToken) -> Result<()>;
}

/// The registrable "class" behind a module: reflects its configuration
/// schema and constructs instances. One factory is registered per
/// `(role, name)` pair; `start` selects instances to build by that name.
pub trait ModuleFactory: Send + Sync {
    fn role(&self) -> Role;
    fn type_name(&self) -> &str;
    fn description(&self) -> &str;
    fn config_schema(&self) -> ConfigSchema;

    /// Build a running instance from a resolved field map (already layered
    /// through [`resolve`] against this factory's schema).
    fn construct(&self, fields: &std::collections::HashMap<String, ConfigValue>) -> Result<Box<dyn Module>>;
}
