//! One-pass configuration loader.
//!
//! The loader walks every registered section, runs the feeder chain
//! against a temporary value tree (later feeders override earlier ones),
//! expands instance-aware sections, applies declared defaults, enforces
//! required fields, runs the sections' validate hooks, and finally commits
//! all new values atomically. Field writes are recorded as provenance
//! throughout.

use std::sync::Arc;

use super::feeder::{FeedSource, Feeder, FieldWrite, InstanceView, SectionView};
use super::provenance::FieldProvenance;
use super::schema::FieldSpec;
use super::{ConfigError, SectionRegistry, SectionTarget, get_path, is_zero_value, set_path};

/// Result of a successful load pass.
#[derive(Debug)]
pub struct LoadReport {
    /// Section keys that were processed, in registration order.
    pub sections: Vec<String>,
    /// Every field write of this pass, oldest first.
    pub provenance: Vec<FieldProvenance>,
}

pub(crate) struct ComputedSection {
    pub key: Arc<str>,
    pub value: serde_json::Value,
    pub target: Arc<dyn SectionTarget>,
}

pub(crate) struct Computed {
    pub sections: Vec<ComputedSection>,
    pub provenance: Vec<FieldProvenance>,
    pub missing: Vec<String>,
}

/// Applies the ordered feeder chain to all registered sections.
#[derive(Default)]
pub struct ConfigLoader {
    feeders: Vec<Arc<dyn Feeder>>,
}

impl ConfigLoader {
    #[must_use]
    pub fn new(feeders: Vec<Arc<dyn Feeder>>) -> Self {
        Self { feeders }
    }

    #[must_use]
    pub fn feeders(&self) -> &[Arc<dyn Feeder>] {
        &self.feeders
    }

    /// Run the full pipeline and commit the results.
    ///
    /// # Errors
    /// `RequiredFieldMissing` aggregates every missing required path across
    /// all sections; `ValidationFailed` aggregates all validate-hook
    /// failures. Nothing is committed when either check fails.
    pub fn load(&self, sections: &SectionRegistry) -> Result<LoadReport, ConfigError> {
        let computed = self.compute(sections)?;

        if !computed.missing.is_empty() {
            return Err(ConfigError::RequiredFieldMissing {
                paths: computed.missing,
            });
        }

        let mut errors = Vec::new();
        for section in &computed.sections {
            if let Err(message) = section.target.validate_value(&section.value) {
                errors.push(message);
            }
        }
        if !errors.is_empty() {
            return Err(ConfigError::ValidationFailed { errors });
        }

        let mut keys = Vec::with_capacity(computed.sections.len());
        for section in computed.sections {
            section.target.commit(section.value)?;
            keys.push(section.key.to_string());
        }

        tracing::debug!(sections = ?keys, writes = computed.provenance.len(), "configuration loaded");

        Ok(LoadReport {
            sections: keys,
            provenance: computed.provenance,
        })
    }

    /// Compute final section values without committing them. Used by
    /// `load` and by the reload path, which needs the new values before
    /// deciding what changed.
    pub(crate) fn compute(&self, sections: &SectionRegistry) -> Result<Computed, ConfigError> {
        let mut out = Computed {
            sections: Vec::new(),
            provenance: Vec::new(),
            missing: Vec::new(),
        };

        for entry in sections.snapshot() {
            let mut value = entry.target.current_value()?;
            let chain: &[Arc<dyn Feeder>] = if entry.feeders.is_empty() {
                &self.feeders
            } else {
                &entry.feeders
            };

            // Base pass over the section schema.
            let view = SectionView {
                key: &entry.key,
                owner: entry.owner.as_deref(),
                schema: &entry.schema,
                instance: None,
            };
            for feeder in chain {
                let writes = feeder.feed(&view)?;
                apply_writes(&entry.key, &mut value, None, writes, &mut out.provenance);
            }

            // Instance-aware expansion: each instance key found in the fed
            // value gets its own feeder pass with the section's prefix.
            if let Some(spec) = &entry.schema.instances {
                let keys = instance_keys(&entry.key, &value, &spec.field)?;
                for ikey in keys {
                    let instance = InstanceView {
                        key: ikey.clone(),
                        env_prefix: (spec.prefix)(&ikey),
                    };
                    let iview = SectionView {
                        key: &entry.key,
                        owner: entry.owner.as_deref(),
                        schema: &spec.item,
                        instance: Some(&instance),
                    };
                    let local_prefix = format!("{}.{}", spec.field, ikey);
                    for feeder in chain {
                        let writes = feeder.feed(&iview)?;
                        apply_writes(
                            &entry.key,
                            &mut value,
                            Some(&local_prefix),
                            writes,
                            &mut out.provenance,
                        );
                    }
                    apply_defaults(
                        &entry.key,
                        &mut value,
                        &spec.item.fields,
                        Some(&local_prefix),
                        &mut out.provenance,
                    );
                    collect_missing(
                        &entry.key,
                        &value,
                        &spec.item.fields,
                        Some(&local_prefix),
                        &mut out.missing,
                    );
                }
            }

            apply_defaults(&entry.key, &mut value, &entry.schema.fields, None, &mut out.provenance);
            collect_missing(&entry.key, &value, &entry.schema.fields, None, &mut out.missing);

            out.sections.push(ComputedSection {
                key: entry.key.clone(),
                value,
                target: entry.target.clone(),
            });
        }

        Ok(out)
    }
}

fn instance_keys(
    section: &str,
    value: &serde_json::Value,
    field: &str,
) -> Result<Vec<String>, ConfigError> {
    match get_path(value, field) {
        Some(serde_json::Value::Object(map)) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            Ok(keys)
        }
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(_) => Err(ConfigError::InstanceExpansion {
            key: section.to_owned(),
            message: format!("field '{field}' must be a map of instance configurations"),
        }),
    }
}

fn apply_writes(
    section: &str,
    value: &mut serde_json::Value,
    local_prefix: Option<&str>,
    writes: Vec<FieldWrite>,
    provenance: &mut Vec<FieldProvenance>,
) {
    for write in writes {
        let local = match local_prefix {
            Some(prefix) => format!("{prefix}.{}", write.path),
            None => write.path,
        };
        set_path(value, &local, write.value.clone());
        provenance.push(FieldProvenance::from_write(
            format!("{section}.{local}"),
            write.value,
            &write.source,
        ));
    }
}

fn apply_defaults(
    section: &str,
    value: &mut serde_json::Value,
    fields: &[FieldSpec],
    local_prefix: Option<&str>,
    provenance: &mut Vec<FieldProvenance>,
) {
    for field in fields {
        let Some(default) = &field.default else {
            continue;
        };
        let local = match local_prefix {
            Some(prefix) => format!("{prefix}.{}", field.path),
            None => field.path.clone(),
        };
        if is_zero_value(get_path(value, &local)) {
            set_path(value, &local, default.clone());
            provenance.push(FieldProvenance::from_write(
                format!("{section}.{local}"),
                default.clone(),
                &FeedSource::Default,
            ));
        }
    }
}

fn collect_missing(
    section: &str,
    value: &serde_json::Value,
    fields: &[FieldSpec],
    local_prefix: Option<&str>,
    missing: &mut Vec<String>,
) {
    for field in fields {
        if !field.required {
            continue;
        }
        let local = match local_prefix {
            Some(prefix) => format!("{prefix}.{}", field.path),
            None => field.path.clone(),
        };
        if is_zero_value(get_path(value, &local)) {
            missing.push(format!("{section}.{local}"));
        }
    }
}
