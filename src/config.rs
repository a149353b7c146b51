//! Layered configuration loading (§10) and the string escaping used to
//! carry config values across the control-plane wire (§6).
//!
//! Grounded in `swarmclone/config.py`'s `Config`, which reads a base TOML
//! file and overlays a custom one on top, logging every override. The
//! third layer here — explicit fields passed through `start` — has no
//! direct analog in `config.py` (that project passes config at process
//! startup only); it is added because §10's `start` request already
//! carries per-selector field maps that must out-rank both TOML layers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::module::{ConfigFieldKind, ConfigSchema, ConfigValue};

/// Parses a TOML value against a field's declared kind, rejecting mismatches
/// rather than coercing them (§10). `Selection` is parsed as a string; the
/// caller (`resolve`) validates it against the field's `options`.
fn toml_to_config_value(value: &toml::Value, kind: ConfigFieldKind) -> Option<ConfigValue> {
    match (kind, value) {
        (ConfigFieldKind::Int, toml::Value::Integer(i)) => Some(ConfigValue::Int(*i)),
        (ConfigFieldKind::Float, toml::Value::Float(f)) => Some(ConfigValue::Float(*f)),
        (ConfigFieldKind::Float, toml::Value::Integer(i)) => Some(ConfigValue::Float(*i as f64)),
        (ConfigFieldKind::Bool, toml::Value::Boolean(b)) => Some(ConfigValue::Bool(*b)),
        (ConfigFieldKind::Str, toml::Value::String(s)) => Some(ConfigValue::Str(s.clone())),
        (ConfigFieldKind::Selection, toml::Value::String(s)) => Some(ConfigValue::Str(s.clone())),
        _ => None,
    }
}

/// Reads an optional TOML overlay for one module's fields, e.g. the
/// `[llm.LlmModule]` table for role `"llm"`, module `"LlmModule"`. Returns
/// an empty map if the file, the role table, or the module table is
/// absent — a missing overlay is not an error.
pub fn load_toml_overlay(
    path: &Path,
    schema: &ConfigSchema,
    role_name: &str,
    module_name: &str,
) -> Result<HashMap<String, ConfigValue>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return Ok(HashMap::new()),
    };
    let document: toml::Value = text
        .parse()
        .map_err(|e| Error::invalid_config(path.display().to_string(), format!("invalid TOML: {e}")))?;

    let table = document
        .get(role_name)
        .and_then(|r| r.get(module_name))
        .and_then(toml::Value::as_table);

    let mut overlay = HashMap::new();
    let Some(table) = table else {
        return Ok(overlay);
    };
    for field in schema {
        if let Some(raw) = table.get(&field.name) {
            match toml_to_config_value(raw, field.kind) {
                Some(value) => {
                    overlay.insert(field.name.clone(), value);
                }
                None => {
                    return Err(Error::invalid_config(
                        &field.name,
                        format!("TOML value {raw} does not match declared kind {:?}", field.kind),
                    ));
                }
            }
        }
    }
    Ok(overlay)
}

/// Layers a schema's defaults under a TOML overlay under explicit fields
/// passed through `start`, logging every override the way `config.py` does.
/// Type-checking against the schema happens in [`crate::module::resolve`];
/// this function only combines layers, it does not itself validate.
pub fn layer_overlays(
    schema: &ConfigSchema,
    toml_overlay: &HashMap<String, ConfigValue>,
    explicit: &HashMap<String, ConfigValue>,
) -> HashMap<String, ConfigValue> {
    let mut merged = HashMap::new();
    for field in schema {
        if let Some(default) = &field.default {
            merged.insert(field.name.clone(), default.clone());
        }
    }
    for (name, value) in toml_overlay {
        if let Some(previous) = merged.insert(name.clone(), value.clone()) {
            debug!(field = name, from = ?previous, to = ?value, "TOML overlay overrides default");
        }
    }
    for (name, value) in explicit {
        if let Some(previous) = merged.insert(name.clone(), value.clone()) {
            debug!(field = name, from = ?previous, to = ?value, "explicit field overrides TOML overlay");
        }
    }
    merged
}

/// Escapes non-printable characters and quotes for configuration transport
/// (§6): `\n`, `\r`, `\t`, `"`, `\\` get their short form; everything else
/// outside printable ASCII gets `\xhh` (one byte) or `\uXXXX` (above
/// `0xFF`). Grounded in `swarmclone/utils.py`'s `escape_all`.
pub fn escape_all(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 || (c as u32) == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if !c.is_ascii() && (c as u32) <= 0xff => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if !c.is_ascii() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_all`]. Unknown escape sequences are passed through
/// literally (the backslash and following character both kept) rather than
/// rejected, matching the permissive spirit of `unescape_all`'s
/// `ast.literal_eval` round trip.
pub fn unescape_all(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('x');
                        out.push_str(&hex);
                    }
                }
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ConfigField, ConfigFieldKind};

    fn roundtrip(s: &str) {
        assert_eq!(unescape_all(&escape_all(s)), s, "round trip failed for {s:?}");
    }

    #[test]
    fn escape_round_trips_printable_and_control_characters() {
        roundtrip("plain text");
        roundtrip("line one\nline two\twith tab");
        roundtrip("quoted \"value\" and a backslash \\");
        roundtrip("emoji like text: caf\u{e9}");
        roundtrip("");
    }

    #[test]
    fn escape_produces_expected_short_forms() {
        assert_eq!(escape_all("a\nb"), "a\\nb");
        assert_eq!(escape_all("\"q\""), "\\\"q\\\"");
        assert_eq!(escape_all("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn toml_overlay_is_empty_when_file_absent() {
        let schema: ConfigSchema = vec![ConfigField::new("rate", ConfigFieldKind::Float, "rate")];
        let overlay = load_toml_overlay(Path::new("/nonexistent/path.toml"), &schema, "tts", "DummyTts").unwrap();
        assert!(overlay.is_empty());
    }

    #[test]
    fn layering_prefers_explicit_over_toml_over_defaults() {
        let schema: ConfigSchema =
            vec![ConfigField::new("rate", ConfigFieldKind::Float, "rate").with_default(ConfigValue::Float(1.0))];
        let mut toml_overlay = HashMap::new();
        toml_overlay.insert("rate".to_string(), ConfigValue::Float(1.5));
        let mut explicit = HashMap::new();
        explicit.insert("rate".to_string(), ConfigValue::Float(2.0));

        let merged = layer_overlays(&schema, &HashMap::new(), &HashMap::new());
        assert_eq!(merged.get("rate"), Some(&ConfigValue::Float(1.0)));

        let merged = layer_overlays(&schema, &toml_overlay, &HashMap::new());
        assert_eq!(merged.get("rate"), Some(&ConfigValue::Float(1.5)));

        let merged = layer_overlays(&schema, &toml_overlay, &explicit);
        assert_eq!(merged.get("rate"), Some(&ConfigValue::Float(2.0)));
    }
}
