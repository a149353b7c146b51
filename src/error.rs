//! Crate-wide error taxonomy.
//!
//! Every fallible public API returns [`Result`]. Backend-specific errors
//! (a generator's transport failure, a synthesizer's model-load failure) are
//! wrapped into [`Error::Backend`] at the module boundary rather than leaked
//! as foreign types.

use thiserror::Error;

/// The kinds of failure the orchestration core can raise.
///
/// These are error *kinds*, not concrete backend exceptions: a real ASR or
/// TTS backend's own error type is expected to be wrapped into
/// [`Error::Backend`] by its module implementation.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Attempted to register a second LLM module, or another role-count violation.
    #[error("config conflict: {0}")]
    ConfigConflict(String),

    /// Attempted to register a module with the `Controller` role or an unspecified role.
    #[error("invalid module role: {0}")]
    InvalidRole(String),

    /// `start` named a module not present in the registry.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// A module constructor raised while handling `start`.
    #[error("failed to construct module {module}: {reason}")]
    Construction { module: String, reason: String },

    /// A module's `run` task raised during execution.
    #[error("module {module} crashed: {reason}")]
    ModuleCrash { module: String, reason: String },

    /// A configuration field failed to parse against its declared kind.
    #[error("invalid config field {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// An opaque error from a backend module implementation (generator,
    /// synthesizer, recognizer, frontend).
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    pub fn construction(module: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Construction {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    pub fn module_crash(module: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::ModuleCrash {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::InvalidConfig {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_error_formats_both_fields() {
        let e = Error::construction("tts-main", "model file missing");
        assert_eq!(
            e.to_string(),
            "failed to construct module tts-main: model file missing"
        );
    }

    #[test]
    fn error_is_clone_for_storage_in_module_state() {
        let e = Error::ModuleCrash {
            module: "llm-main".into(),
            reason: "panicked".into(),
        };
        let e2 = e.clone();
        assert_eq!(e.to_string(), e2.to_string());
    }
}
