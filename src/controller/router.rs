//! The fan-out routing algorithm (§4.2): for each destination role, attempt
//! delivery to every live module of that role; drop-on-full rather than
//! block. Grounded in `swarmclone/controller.py`'s `handle_message`
//! (`for role in destinations: for module in self.modules[role]: put(msg)`),
//! generalized with the explicit back-pressure policy this core requires
//! that the Python original leaves implicit.

use std::collections::HashMap;

use tracing::warn;

use crate::message::{Message, Role};
use crate::module::ModuleInstance;

/// Deliver `message` to every live module whose role is among its
/// destinations. Returns the number of successful deliveries; logs a
/// `warn`-level drop for each full queue (`QueueOverflow`, §7 — logged, not
/// surfaced as an error).
pub fn deliver(modules: &HashMap<Role, Vec<ModuleInstance>>, message: &Message) -> usize {
    let mut delivered = 0;
    for role in message.destinations() {
        let Some(instances) = modules.get(role) else {
            continue;
        };
        for instance in instances {
            if !instance.is_running() {
                continue;
            }
            match instance.try_deliver(message.clone()) {
                Ok(()) => {
                    message.record_observation(instance.name());
                    delivered += 1;
                }
                Err(_) => {
                    warn!(
                        module = instance.name(),
                        role = %role,
                        message = message.name(),
                        "task_queue full, dropping message (QueueOverflow)"
                    );
                }
            }
        }
    }
    delivered
}
