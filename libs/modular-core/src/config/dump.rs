//! Effective configuration inspection.
//!
//! Renders the committed state of every registered section as one JSON
//! tree, with fields marked sensitive in the section schemas redacted.
//! Read-only; intended for `--print-config` style diagnostics.

use modular_utils::secret_string::REDACTED_PLACEHOLDER;

use super::diff::path_matches;
use super::{ConfigError, SectionRegistry};

/// All registered section keys, sorted ascending.
#[must_use]
pub fn list_section_keys(sections: &SectionRegistry) -> Vec<String> {
    let mut keys: Vec<String> = sections.keys().iter().map(|k| k.to_string()).collect();
    keys.sort();
    keys
}

/// Render the effective configuration of all sections, sensitive values
/// replaced by the redaction marker.
///
/// # Errors
/// Propagates section encode failures.
pub fn render_effective_config(sections: &SectionRegistry) -> Result<serde_json::Value, ConfigError> {
    let mut root = serde_json::Map::new();
    for entry in sections.snapshot() {
        let mut value = entry.target.current_value()?;
        let patterns = entry.schema.sensitive_paths();
        if !patterns.is_empty() {
            redact_in_place(&mut value, String::new(), &patterns);
        }
        root.insert(entry.key.to_string(), value);
    }
    Ok(serde_json::Value::Object(root))
}

fn redact_in_place(value: &mut serde_json::Value, prefix: String, patterns: &[String]) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                redact_in_place(v, path, patterns);
            }
        }
        serde_json::Value::Null => {}
        other => {
            if patterns.iter().any(|p| path_matches(p, &prefix)) {
                *other = serde_json::Value::String(REDACTED_PLACEHOLDER.to_owned());
            }
        }
    }
}
