//! Reflective configuration schema shared by every module class.
//!
//! Mirrors the field-set `swarmclone/config.py` ferries through its TOML
//! overlay, generalized into the typed schema the control plane's
//! `startup_param` operation reports (§6).

use std::collections::HashMap;

use crate::error::{Error, Result};

/// The declared kind of a configuration field. Values are rejected with
/// [`Error::InvalidConfig`] rather than silently coerced when they don't
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFieldKind {
    Int,
    Float,
    Bool,
    Str,
    Selection,
}

/// A parsed configuration value. `Selection` values are carried as `Str`
/// and validated against the field's `options` list by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ConfigValue {
    pub fn kind(&self) -> ConfigFieldKind {
        match self {
            ConfigValue::Int(_) => ConfigFieldKind::Int,
            ConfigValue::Float(_) => ConfigFieldKind::Float,
            ConfigValue::Bool(_) => ConfigFieldKind::Bool,
            ConfigValue::Str(_) => ConfigFieldKind::Str,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// One configuration knob as reported by a module class's `config_schema()`.
#[derive(Debug, Clone)]
pub struct ConfigField {
    pub name: String,
    pub kind: ConfigFieldKind,
    pub desc: String,
    pub required: bool,
    pub default: Option<ConfigValue>,
    pub options: Option<Vec<String>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub password: bool,
    pub multiline: bool,
}

impl ConfigField {
    pub fn new(name: impl Into<String>, kind: ConfigFieldKind, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            desc: desc.into(),
            required: false,
            default: None,
            options: None,
            min: None,
            max: None,
            step: None,
            password: false,
            multiline: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: ConfigValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn password(mut self) -> Self {
        self.password = true;
        self
    }

    pub fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }
}

pub type ConfigSchema = Vec<ConfigField>;

/// Layers `config_schema()` defaults, then caller-supplied fields, into a
/// resolved map, rejecting type mismatches and missing required fields.
/// This is the field-wise half of the "typed config object or field map"
/// equivalence required by §4.1 — the other half is each module's own
/// `From<HashMap<String, ConfigValue>>`-style constructor.
pub fn resolve(schema: &ConfigSchema, supplied: &HashMap<String, ConfigValue>) -> Result<HashMap<String, ConfigValue>> {
    let mut resolved = HashMap::new();
    for field in schema {
        match supplied.get(&field.name) {
            Some(value) => {
                // `Selection` values are carried as `Str` (see `ConfigValue`'s
                // doc comment); validate against `options` instead of
                // demanding kind equality, which a `Str` can never satisfy.
                if field.kind == ConfigFieldKind::Selection {
                    let selected = value.as_str().ok_or_else(|| {
                        Error::invalid_config(&field.name, format!("expected Selection, got {:?}", value.kind()))
                    })?;
                    if let Some(options) = &field.options {
                        if !options.iter().any(|o| o == selected) {
                            return Err(Error::invalid_config(
                                &field.name,
                                format!("{selected:?} is not one of {options:?}"),
                            ));
                        }
                    }
                } else if value.kind() != field.kind {
                    return Err(Error::invalid_config(
                        &field.name,
                        format!("expected {:?}, got {:?}", field.kind, value.kind()),
                    ));
                }
                resolved.insert(field.name.clone(), value.clone());
            }
            None => match &field.default {
                Some(default) => {
                    resolved.insert(field.name.clone(), default.clone());
                }
                None if field.required => {
                    return Err(Error::invalid_config(&field.name, "missing required field"));
                }
                None => {}
            },
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ConfigSchema {
        vec![
            ConfigField::new("voice", ConfigFieldKind::Selection, "speaker voice")
                .with_options(vec!["alto".into(), "bass".into()])
                .with_default(ConfigValue::Str("alto".into())),
            ConfigField::new("rate", ConfigFieldKind::Float, "speech rate")
                .with_range(0.5, 2.0)
                .with_default(ConfigValue::Float(1.0)),
            ConfigField::new("api_key", ConfigFieldKind::Str, "auth token").required().password(),
        ]
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let supplied = HashMap::new();
        let err = resolve(&schema(), &supplied).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn defaults_fill_unsupplied_fields() {
        let mut supplied = HashMap::new();
        supplied.insert("api_key".to_string(), ConfigValue::Str("secret".into()));
        let resolved = resolve(&schema(), &supplied).unwrap();
        assert_eq!(resolved.get("voice"), Some(&ConfigValue::Str("alto".into())));
        assert_eq!(resolved.get("rate"), Some(&ConfigValue::Float(1.0)));
    }

    #[test]
    fn type_mismatch_is_rejected_not_coerced() {
        let mut supplied = HashMap::new();
        supplied.insert("api_key".to_string(), ConfigValue::Str("secret".into()));
        supplied.insert("rate".to_string(), ConfigValue::Str("fast".into()));
        let err = resolve(&schema(), &supplied).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { field, .. } if field == "rate"));
    }

    #[test]
    fn selection_field_accepts_a_supplied_option() {
        let mut supplied = HashMap::new();
        supplied.insert("api_key".to_string(), ConfigValue::Str("secret".into()));
        supplied.insert("voice".to_string(), ConfigValue::Str("bass".into()));
        let resolved = resolve(&schema(), &supplied).unwrap();
        assert_eq!(resolved.get("voice"), Some(&ConfigValue::Str("bass".into())));
    }

    #[test]
    fn selection_field_rejects_a_value_outside_options() {
        let mut supplied = HashMap::new();
        supplied.insert("api_key".to_string(), ConfigValue::Str("secret".into()));
        supplied.insert("voice".to_string(), ConfigValue::Str("soprano".into()));
        let err = resolve(&schema(), &supplied).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { field, .. } if field == "voice"));
    }
}
