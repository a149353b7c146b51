//! Bounded history buffer for introspection (§3 Lifecycles, §6 `get_messages`).
//!
//! Grounded in the teacher's `MessageStorage` (`Arc<RwLock<Vec<Message>>>`
//! with `add`/`get_all`/`clear`), generalized to a ring buffer capped at 200
//! entries so a long-running controller doesn't grow this without bound.

use std::collections::VecDeque;

use crate::message::Message;

/// Matches §4.2 "retain the last N (=200) routed messages for observability".
pub const HISTORY_CAPACITY: usize = 200;

#[derive(Default)]
pub struct History {
    entries: VecDeque<Message>,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, message: Message) {
        if self.entries.len() >= HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `get_messages` is destructive (§9 Open Questions decision): returns
    /// everything buffered and clears it.
    pub fn drain(&mut self) -> Vec<Message> {
        self.entries.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{self, MessageRef, Role};

    #[test]
    fn caps_at_200_dropping_oldest() {
        let mut h = History::new();
        for _ in 0..250 {
            h.push(message::audio_finished(MessageRef::new(Role::Frontend, "f1")));
        }
        assert_eq!(h.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut h = History::new();
        h.push(message::audio_finished(MessageRef::new(Role::Frontend, "f1")));
        assert_eq!(h.drain().len(), 1);
        assert!(h.is_empty());
    }
}
