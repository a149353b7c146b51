//! Real-time conversational-avatar orchestrator: module lifecycle and
//! message routing (`controller`), the LLM turn-taking state machine
//! (`llm`), and the back-pressured TTS streaming pipeline (`tts`), built
//! on an immutable message envelope (`message`) and a closed-set module
//! contract (`module`).

pub mod config;
pub mod controller;
pub mod error;
pub mod llm;
pub mod message;
pub mod module;
pub mod tts;

pub use error::{Error, Result};
