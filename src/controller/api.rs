//! Typed request/response shapes for the control-plane operations of §6.
//! The core exposes these as plain async methods on [`super::Controller`];
//! binding them to HTTP or any other transport is explicitly out of scope
//! (§1) and left to a thin adapter.

use std::collections::HashMap;

use crate::message::Role;
use crate::module::{ConfigSchema, ConfigValue};

/// Identifies which registered module class to instantiate under which role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleSelector {
    pub role: Role,
    pub type_name: String,
}

impl ModuleSelector {
    pub fn new(role: Role, type_name: impl Into<String>) -> Self {
        Self {
            role,
            type_name: type_name.into(),
        }
    }
}

/// `start` request body (§6): per-selector field overrides, plus which
/// selectors to actually instantiate.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub cfg: HashMap<ModuleSelector, HashMap<String, ConfigValue>>,
    pub selected: Vec<ModuleSelector>,
}

impl StartRequest {
    pub fn new(selected: Vec<ModuleSelector>) -> Self {
        Self {
            cfg: HashMap::new(),
            selected,
        }
    }

    pub fn with_fields(mut self, selector: ModuleSelector, fields: HashMap<String, ConfigValue>) -> Self {
        self.cfg.insert(selector, fields);
        self
    }
}

/// Outcome of `start` (§6: `{status: "OK"}` / `404` / `500`, modeled as a
/// typed enum rather than status codes since the wire binding is out of
/// scope).
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Ok,
    UnknownModules(Vec<ModuleSelector>),
    ConfigConflict(String),
    ConstructionFailed { selector: ModuleSelector, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub role: Role,
    pub module_name: String,
    pub running: bool,
    pub loaded: bool,
    pub err: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupParamEntry {
    pub role: Role,
    pub module_name: String,
    pub desc: String,
    pub config: ConfigSchema,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Getter {
    pub name: String,
    pub time: i64,
}

/// One drained history entry, matching the `get_messages` response shape
/// (§6) field for field.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message_name: String,
    pub send_time: i64,
    pub message_type: String,
    pub message_source: String,
    pub message_destinations: Vec<String>,
    pub message: Vec<(String, String)>,
    pub getters: Vec<Getter>,
}

impl From<&crate::message::Message> for HistoryEntry {
    fn from(m: &crate::message::Message) -> Self {
        HistoryEntry {
            message_name: m.name().to_string(),
            send_time: m.send_time(),
            message_type: format!("{:?}", m.kind()),
            message_source: m.source().to_string(),
            message_destinations: m.destinations().iter().map(|r| r.to_string()).collect(),
            message: m.payload().fields(),
            getters: m
                .observed_by()
                .into_iter()
                .map(|o| Getter {
                    name: o.module_name,
                    time: o.time,
                })
                .collect(),
        }
    }
}

/// `api` synthetic event injection request (§6): only `ASR` injection is
/// specified by the source material.
#[derive(Debug, Clone)]
pub struct ApiInjectRequest {
    pub speaker_name: String,
    pub message: String,
}
