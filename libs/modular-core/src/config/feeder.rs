//! Feeders: ordered sources writing values into configuration sections.
//!
//! Every feeder reports each field it sets as a [`FieldWrite`]; the loader
//! applies writes in chain order (later feeders override earlier ones) and
//! records provenance for every write.

use std::collections::HashMap;

use super::schema::SectionSchema;
use super::ConfigError;

/// Where a field value came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedSource {
    Env { var: String },
    DotEnv { path: String, var: String },
    File { path: String },
    Override,
    Default,
}

impl FeedSource {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FeedSource::Env { .. } => "env",
            FeedSource::DotEnv { .. } => "dotenv",
            FeedSource::File { .. } => "file",
            FeedSource::Override => "override",
            FeedSource::Default => "default",
        }
    }

    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            FeedSource::Env { var } => var.clone(),
            FeedSource::DotEnv { path, var } => format!("{path}:{var}"),
            FeedSource::File { path } => path.clone(),
            FeedSource::Override | FeedSource::Default => String::new(),
        }
    }
}

/// One field write produced by a feeder, path relative to the viewed
/// schema root.
#[derive(Clone, Debug)]
pub struct FieldWrite {
    pub path: String,
    pub value: serde_json::Value,
    pub source: FeedSource,
}

/// Instance context for instance-aware expansion passes.
#[derive(Clone, Debug)]
pub struct InstanceView {
    /// The instance key, e.g. `primary`.
    pub key: String,
    /// Environment fragment produced by the section's prefix function,
    /// e.g. `DB_PRIMARY_`.
    pub env_prefix: String,
}

/// What a feeder sees of one section (or one instance of it).
pub struct SectionView<'a> {
    pub key: &'a str,
    /// Module that owns the section; drives module-aware env resolution.
    pub owner: Option<&'a str>,
    pub schema: &'a SectionSchema,
    /// `Some` during instance expansion passes; the schema is then the
    /// instance item schema.
    pub instance: Option<&'a InstanceView>,
}

pub trait Feeder: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the writes this source has for the viewed section.
    ///
    /// # Errors
    /// Feeder-specific failures (unreadable file, parse error, ...).
    fn feed(&self, view: &SectionView<'_>) -> Result<Vec<FieldWrite>, ConfigError>;
}

/// Uppercase a name into an environment fragment (`users-info` →
/// `USERS_INFO`).
pub(crate) fn env_fragment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Coerce an environment string into a JSON scalar. A string-typed default
/// in the field spec pins the value to a string; otherwise booleans and
/// numbers are recognized.
pub(crate) fn coerce_scalar(raw: &str, string_hint: bool) -> serde_json::Value {
    if string_hint {
        return serde_json::Value::String(raw.to_owned());
    }
    match raw {
        "true" => return serde_json::Value::Bool(true),
        "false" => return serde_json::Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return serde_json::Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return serde_json::Value::Number(n);
        }
    }
    serde_json::Value::String(raw.to_owned())
}

/// Candidate variable names for one field, most specific first.
///
/// Base pass for a module-owned section tries `<prefix><MODULE>_<TAG>`,
/// `<prefix><TAG>_<MODULE>`, `<prefix><TAG>`; instance passes use the
/// section's instance prefix: `<prefix><INSTANCE-PREFIX><TAG>`.
pub(crate) fn candidate_names(view: &SectionView<'_>, tag: &str, prefix: &str) -> Vec<String> {
    if let Some(instance) = view.instance {
        return vec![format!("{prefix}{}{tag}", instance.env_prefix)];
    }
    match view.owner {
        Some(owner) => {
            let module = env_fragment(owner);
            vec![
                format!("{prefix}{module}_{tag}"),
                format!("{prefix}{tag}_{module}"),
                format!("{prefix}{tag}"),
            ]
        }
        None => vec![format!("{prefix}{tag}")],
    }
}

/// Resolve the schema's env-tagged fields against a lookup function,
/// first candidate wins.
pub(crate) fn feed_from_lookup(
    view: &SectionView<'_>,
    prefix: &str,
    lookup: impl Fn(&str) -> Option<String>,
    source: impl Fn(String) -> FeedSource,
) -> Vec<FieldWrite> {
    let mut writes = Vec::new();
    for field in &view.schema.fields {
        let Some(tag) = &field.env else {
            continue;
        };
        // A string-typed default pins the field to a string even when the
        // raw value looks numeric.
        let string_hint = matches!(&field.default, Some(serde_json::Value::String(_)));
        for candidate in candidate_names(view, tag, prefix) {
            if let Some(raw) = lookup(&candidate) {
                writes.push(FieldWrite {
                    path: field.path.clone(),
                    value: coerce_scalar(&raw, string_hint),
                    source: source(candidate),
                });
                break;
            }
        }
    }
    writes
}

/// Feeds values from process environment variables.
pub struct EnvFeeder {
    prefix: String,
}

impl EnvFeeder {
    /// Feeder with no global prefix; variable names come straight from the
    /// field tags (plus module/instance fragments).
    #[must_use]
    pub fn new() -> Self {
        Self::prefixed("")
    }

    /// Feeder whose variable names all start with `prefix`.
    #[must_use]
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvFeeder {
    fn default() -> Self {
        Self::new()
    }
}

impl Feeder for EnvFeeder {
    fn name(&self) -> &str {
        "env"
    }

    fn feed(&self, view: &SectionView<'_>) -> Result<Vec<FieldWrite>, ConfigError> {
        Ok(feed_from_lookup(
            view,
            &self.prefix,
            |var| std::env::var(var).ok(),
            |var| FeedSource::Env { var },
        ))
    }
}

/// Programmatic overrides: a map of section key → configuration object.
/// The map is copied at construction; later mutation by the caller has no
/// effect.
pub struct MapFeeder {
    sections: serde_json::Map<String, serde_json::Value>,
}

impl MapFeeder {
    #[must_use]
    pub fn new(sections: serde_json::Value) -> Self {
        let sections = match sections {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self { sections }
    }
}

impl Feeder for MapFeeder {
    fn name(&self) -> &str {
        "override"
    }

    fn feed(&self, view: &SectionView<'_>) -> Result<Vec<FieldWrite>, ConfigError> {
        if view.instance.is_some() {
            // Instance values are already part of the section object.
            return Ok(Vec::new());
        }
        let Some(section) = self.sections.get(view.key) else {
            return Ok(Vec::new());
        };
        let mut flat = Vec::new();
        flatten_section(String::new(), section, &mut flat);
        Ok(flat
            .into_iter()
            .map(|(path, value)| FieldWrite {
                path,
                value,
                source: FeedSource::Override,
            })
            .collect())
    }
}

/// Flatten a section object into leaf writes; arrays and scalars are
/// leaves, null leaves are dropped (absent).
pub(crate) fn flatten_section(
    prefix: String,
    value: &serde_json::Value,
    out: &mut Vec<(String, serde_json::Value)>,
) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_section(path, v, out);
            }
        }
        serde_json::Value::Null => {}
        other => out.push((prefix, other.clone())),
    }
}

/// Candidate-name lookup over an in-memory variable map; shared by the
/// dotenv feeder and tests.
pub(crate) fn feed_from_vars(
    view: &SectionView<'_>,
    prefix: &str,
    vars: &HashMap<String, String>,
    source: impl Fn(String) -> FeedSource,
) -> Vec<FieldWrite> {
    feed_from_lookup(view, prefix, |var| vars.get(var).cloned(), source)
}
