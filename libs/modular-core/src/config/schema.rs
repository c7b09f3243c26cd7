//! Field descriptors for configuration sections.
//!
//! All metadata a section carries beyond its serde shape lives here:
//! environment tags, defaults, required/sensitive flags and documentation.
//! This is the single descriptor stage of the pipeline; feeders, the
//! loader and the differ all work from these specs and never inspect
//! target types themselves.

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use std::sync::Arc;

/// A typed configuration section.
///
/// `schema()` describes the fields the pipeline should manage; `validate()`
/// runs after all feeders and defaults have been applied, before the value
/// is committed.
pub trait ConfigSchema: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    fn schema() -> SectionSchema {
        SectionSchema::new()
    }

    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Descriptor for a single (possibly nested) field, addressed by dotted
/// path relative to the section root.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub path: String,
    /// Environment tag; the feeder composes the full variable name.
    pub env: Option<String>,
    pub default: Option<serde_json::Value>,
    pub required: bool,
    pub sensitive: bool,
    pub description: Option<String>,
}

impl FieldSpec {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            env: None,
            default: None,
            required: false,
            sensitive: false,
            description: None,
        }
    }

    #[must_use]
    pub fn env(mut self, tag: impl Into<String>) -> Self {
        self.env = Some(tag.into());
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Expansion rule for instance-aware sections: `field` addresses a map of
/// instance-keyed sub-configurations, each fed separately with an
/// instance-specific environment prefix (e.g. `DB_PRIMARY_`).
#[derive(Clone)]
pub struct InstanceSpec {
    pub field: String,
    pub prefix: Arc<dyn Fn(&str) -> String + Send + Sync>,
    pub item: Arc<SectionSchema>,
}

impl InstanceSpec {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        prefix: impl Fn(&str) -> String + Send + Sync + 'static,
        item: SectionSchema,
    ) -> Self {
        Self {
            field: field.into(),
            prefix: Arc::new(prefix),
            item: Arc::new(item),
        }
    }
}

impl fmt::Debug for InstanceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSpec")
            .field("field", &self.field)
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

/// All descriptors of one section.
#[derive(Clone, Debug, Default)]
pub struct SectionSchema {
    pub fields: Vec<FieldSpec>,
    pub instances: Option<InstanceSpec>,
}

impl SectionSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    #[must_use]
    pub fn instances(mut self, spec: InstanceSpec) -> Self {
        self.instances = Some(spec);
        self
    }

    #[must_use]
    pub fn find(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Sensitive field paths, relative to the section root. Instance item
    /// fields are reported under `<field>.*.<path>`.
    #[must_use]
    pub fn sensitive_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.sensitive)
            .map(|f| f.path.clone())
            .collect();
        if let Some(spec) = &self.instances {
            for f in spec.item.fields.iter().filter(|f| f.sensitive) {
                out.push(format!("{}.*.{}", spec.field, f.path));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_field_metadata() {
        let schema = SectionSchema::new()
            .field(
                FieldSpec::new("host")
                    .env("HOST")
                    .default_value(json!("127.0.0.1"))
                    .describe("bind address"),
            )
            .field(FieldSpec::new("password").env("PASSWORD").sensitive().required());

        let host = schema.find("host").unwrap();
        assert_eq!(host.env.as_deref(), Some("HOST"));
        assert_eq!(host.default, Some(json!("127.0.0.1")));
        assert!(!host.required);

        let password = schema.find("password").unwrap();
        assert!(password.required);
        assert!(password.sensitive);
        assert_eq!(schema.sensitive_paths(), vec!["password".to_owned()]);
    }

    #[test]
    fn instance_sensitive_paths_use_wildcard() {
        let item = SectionSchema::new().field(FieldSpec::new("dsn").env("DSN").sensitive());
        let schema = SectionSchema::new()
            .instances(InstanceSpec::new("connections", |k| format!("DB_{}_", k.to_uppercase()), item));

        assert_eq!(schema.sensitive_paths(), vec!["connections.*.dsn".to_owned()]);
        let spec = schema.instances.unwrap();
        assert_eq!((spec.prefix)("primary"), "DB_PRIMARY_");
    }
}
