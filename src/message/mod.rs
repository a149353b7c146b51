//! The message envelope and its catalog of well-known shapes.
//!
//! Mirrors the data model in `swarmclone/messages.py`: an immutable
//! envelope carrying a typed payload, a source reference, and a
//! destination role set, plus introspection bookkeeping (`observed_by`)
//! that is advisory only and never gates delivery.

mod catalog;
mod types;

pub use catalog::*;
pub use types::{
    neutral_emotion, AlignEntry, Emotion, Kind, Message, MessageRef, ObservedBy, Payload, Role,
};
