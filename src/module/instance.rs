//! A live module bound to its channels, cancellation token, and the shared
//! status cells the controller reads for `get_status` (§6). Grounded in the
//! teacher's `OrchestratorHandle`: a thin handle holding senders plus
//! `Arc<AtomicBool>`/`Arc<Mutex<..>>` status cells, kept separate from the
//! boxed trait object that actually runs on its own task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::message::{Message, Role};

/// Bound on both `task_queue` and `results_queue` for every module (§3, §5).
pub const QUEUE_CAPACITY: usize = 128;

/// A module attached to the controller: its channels, lifecycle flag, and
/// terminal-error slot, plus the join handles for its two tasks (the
/// module's own `run` and the handler pumping `results_queue` into the
/// router).
pub struct ModuleInstance {
    name: String,
    role: Role,
    task_tx: mpsc::Sender<Message>,
    running: Arc<AtomicBool>,
    error: Arc<Mutex<Option<Error>>>,
    cancel: CancellationToken,
    module_task: Option<JoinHandle<()>>,
    handler_task: Option<JoinHandle<()>>,
}

impl ModuleInstance {
    pub(crate) fn new(
        name: String,
        role: Role,
        task_tx: mpsc::Sender<Message>,
        running: Arc<AtomicBool>,
        error: Arc<Mutex<Option<Error>>>,
        cancel: CancellationToken,
        module_task: JoinHandle<()>,
        handler_task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            role,
            task_tx,
            running,
            error,
            cancel,
            module_task: Some(module_task),
            handler_task: Some(handler_task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<Error> {
        self.error.lock().clone()
    }

    /// Route-time delivery attempt. Drop-on-full: never blocks the router
    /// (§4.2 Routing algorithm). Returns the message back on failure so the
    /// caller can log a `QueueOverflow` with context.
    pub fn try_deliver(&self, message: Message) -> std::result::Result<(), Message> {
        match self.task_tx.try_send(message) {
            Ok(()) => {
                debug!(module = %self.name, role = %self.role, "delivered message to task_queue");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(m)) => Err(m),
            Err(mpsc::error::TrySendError::Closed(m)) => Err(m),
        }
    }

    /// Cancel both tasks and wait for them to observe it (§4.2 Stop
    /// semantics). Consumes the instance: once stopped, a module is gone
    /// from the controller's map, not merely marked not-running.
    pub async fn cancel_and_join(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.module_task.take() {
            if let Err(e) = handle.await {
                warn!(module = %self.name, error = %e, "module task join failed");
            }
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(e) = handle.await {
                warn!(module = %self.name, error = %e, "handler task join failed");
            }
        }
    }
}
