//! Configuration pipeline: sections, feeders, loader, provenance, diff and
//! reload.
//!
//! Every registered section owns a typed target behind an `ArcSwap`; the
//! loader computes new values from the ordered feeder chain and commits
//! them atomically. Values travel as `serde_json::Value` trees between
//! feeders and targets.

pub mod diff;
pub mod dump;
pub mod feeder;
pub mod file;
pub mod loader;
pub mod provenance;
pub mod reload;
pub mod schema;

pub use diff::{ChangeKind, ChangeSummary, ConfigDiff, DiffOptions, FieldChange};
pub use dump::{list_section_keys, render_effective_config};
pub use feeder::{EnvFeeder, FeedSource, Feeder, FieldWrite, MapFeeder, SectionView};
pub use file::{DotEnvFeeder, FileFeeder};
pub use loader::{ConfigLoader, LoadReport};
pub use provenance::{FieldProvenance, ProvenanceLog};
pub use reload::{ReloadError, ReloadReport, ReloadTrigger};
pub use schema::{ConfigSchema, FieldSpec, InstanceSpec, SectionSchema};

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Reserved section key of the application root configuration.
pub const MAIN_CONFIG_SECTION: &str = "_main";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration section '{key}' is already registered")]
    SectionAlreadyRegistered { key: String },

    #[error("configuration section not found: '{key}'")]
    SectionNotFound { key: String },

    #[error("feeder '{feeder}' failed: {message}")]
    Feeder { feeder: String, message: String },

    #[error("failed to read config file '{path}'")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    FileParse { path: String, message: String },

    #[error("unsupported config file format: '{path}'")]
    UnsupportedFormat { path: String },

    #[error("required configuration fields missing: {}", paths.join(", "))]
    RequiredFieldMissing { paths: Vec<String> },

    #[error("configuration validation failed:\n{}", errors.join("\n"))]
    ValidationFailed { errors: Vec<String> },

    #[error("instance expansion failed for section '{key}': {message}")]
    InstanceExpansion { key: String, message: String },

    #[error("section '{key}' cannot be decoded")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("section '{key}' cannot be encoded")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Value-tree helpers shared by feeders, loader and differ
// ---------------------------------------------------------------------------

/// Set a dotted path inside a JSON tree, creating intermediate objects and
/// replacing scalar intermediates.
pub(crate) fn set_path(root: &mut serde_json::Value, path: &str, value: serde_json::Value) {
    if !root.is_object() {
        *root = serde_json::Value::Object(serde_json::Map::new());
    }
    let mut cursor = root;
    let mut pending = Some(value);
    let parts: Vec<&str> = path.split('.').collect();
    for (i, part) in parts.iter().enumerate() {
        let Some(map) = cursor.as_object_mut() else {
            return;
        };
        if i + 1 == parts.len() {
            if let Some(v) = pending.take() {
                map.insert((*part).to_owned(), v);
            }
            return;
        }
        let next = map
            .entry((*part).to_owned())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if !next.is_object() {
            *next = serde_json::Value::Object(serde_json::Map::new());
        }
        cursor = next;
    }
}

/// Read a dotted path from a JSON tree.
pub(crate) fn get_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut cursor = root;
    for part in path.split('.') {
        cursor = cursor.as_object()?.get(part)?;
    }
    Some(cursor)
}

/// Zero-value check used for default substitution and required-field
/// enforcement: absent, null, empty string, numeric zero, false and empty
/// containers all count as unset.
pub(crate) fn is_zero_value(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.is_empty(),
        Some(serde_json::Value::Number(n)) => {
            n.as_i64() == Some(0)
                || n.as_u64() == Some(0)
                || n.as_f64().is_some_and(|f| f.abs() < f64::EPSILON)
        }
        Some(serde_json::Value::Bool(b)) => !b,
        Some(serde_json::Value::Array(a)) => a.is_empty(),
        Some(serde_json::Value::Object(o)) => o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Section targets
// ---------------------------------------------------------------------------

/// Type-erased section target the loader works against.
pub(crate) trait SectionTarget: Send + Sync {
    fn current_value(&self) -> Result<serde_json::Value, ConfigError>;

    /// Decode + run the section's `validate` hook without committing.
    /// Returns a human-readable message on failure.
    fn validate_value(&self, value: &serde_json::Value) -> Result<(), String>;

    fn commit(&self, value: serde_json::Value) -> Result<(), ConfigError>;
}

/// Typed handle to a registered section. Cheap to clone via `Arc`; reads
/// see the last committed value.
#[derive(Debug)]
pub struct SectionHandle<T: ConfigSchema> {
    key: Arc<str>,
    current: ArcSwap<T>,
}

impl<T: ConfigSchema> SectionHandle<T> {
    fn new(key: Arc<str>, initial: T) -> Self {
        Self {
            key,
            current: ArcSwap::from_pointee(initial),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the current value.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }
}

impl<T: ConfigSchema> SectionTarget for SectionHandle<T> {
    fn current_value(&self) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(&*self.current.load_full()).map_err(|source| ConfigError::Encode {
            key: self.key.to_string(),
            source,
        })
    }

    fn validate_value(&self, value: &serde_json::Value) -> Result<(), String> {
        let typed: T = serde_json::from_value(value.clone())
            .map_err(|e| format!("section '{}': {e}", self.key))?;
        typed
            .validate()
            .map_err(|e| format!("section '{}': {e}", self.key))
    }

    fn commit(&self, value: serde_json::Value) -> Result<(), ConfigError> {
        let typed: T = serde_json::from_value(value).map_err(|source| ConfigError::Decode {
            key: self.key.to_string(),
            source,
        })?;
        self.current.store(Arc::new(typed));
        Ok(())
    }
}

/// One registered section as the loader sees it.
#[derive(Clone)]
pub(crate) struct SectionEntry {
    pub key: Arc<str>,
    pub owner: Option<Arc<str>>,
    pub target: Arc<dyn SectionTarget>,
    pub schema: SectionSchema,
    /// Section-local feeders; when non-empty they replace the
    /// application-wide chain for this section.
    pub feeders: Vec<Arc<dyn Feeder>>,
}

#[derive(Default)]
struct SectionsInner {
    entries: Vec<SectionEntry>,
    index: HashMap<Arc<str>, usize>,
}

/// Registry of configuration sections, keyed by unique section key.
#[derive(Default)]
pub struct SectionRegistry {
    inner: RwLock<SectionsInner>,
}

impl SectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed section. The schema comes from `T::schema()`.
    ///
    /// # Errors
    /// `SectionAlreadyRegistered` on key collision.
    pub fn register<T: ConfigSchema>(
        &self,
        key: &str,
        initial: T,
        owner: Option<&str>,
    ) -> Result<Arc<SectionHandle<T>>, ConfigError> {
        self.register_with_feeders(key, initial, owner, Vec::new())
    }

    /// Register a typed section with section-local feeders that override
    /// the application-wide chain.
    ///
    /// # Errors
    /// `SectionAlreadyRegistered` on key collision.
    pub fn register_with_feeders<T: ConfigSchema>(
        &self,
        key: &str,
        initial: T,
        owner: Option<&str>,
        feeders: Vec<Arc<dyn Feeder>>,
    ) -> Result<Arc<SectionHandle<T>>, ConfigError> {
        let mut w = self.inner.write();
        if w.index.contains_key(key) {
            return Err(ConfigError::SectionAlreadyRegistered {
                key: key.to_owned(),
            });
        }
        let key: Arc<str> = Arc::from(key);
        let handle = Arc::new(SectionHandle::new(key.clone(), initial));
        let entry = SectionEntry {
            key: key.clone(),
            owner: owner.map(Arc::from),
            target: handle.clone(),
            schema: T::schema(),
            feeders,
        };
        let idx = w.entries.len();
        w.entries.push(entry);
        w.index.insert(key, idx);
        Ok(handle)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().index.contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.inner.read().entries.iter().map(|e| e.key.clone()).collect()
    }

    /// Module that registered the section, if any.
    #[must_use]
    pub fn owner_of(&self, key: &str) -> Option<Arc<str>> {
        let r = self.inner.read();
        let idx = *r.index.get(key)?;
        r.entries[idx].owner.clone()
    }

    pub(crate) fn snapshot(&self) -> Vec<SectionEntry> {
        self.inner.read().entries.clone()
    }

    /// One combined tree: section key → current committed value.
    ///
    /// # Errors
    /// Propagates section encode failures.
    pub fn combined_value(&self) -> Result<serde_json::Value, ConfigError> {
        let mut root = serde_json::Map::new();
        for entry in self.snapshot() {
            root.insert(entry.key.to_string(), entry.target.current_value()?);
        }
        Ok(serde_json::Value::Object(root))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

/// Module-scoped registration facade: sections registered through a scope
/// are attributed to the owning module for env-name resolution, reload
/// routing and diagnostics.
pub struct SectionScope<'a> {
    registry: &'a SectionRegistry,
    module: &'a str,
}

impl<'a> SectionScope<'a> {
    pub(crate) fn new(registry: &'a SectionRegistry, module: &'a str) -> Self {
        Self { registry, module }
    }

    /// # Errors
    /// See [`SectionRegistry::register`].
    pub fn register<T: ConfigSchema>(
        &self,
        key: &str,
        initial: T,
    ) -> Result<Arc<SectionHandle<T>>, ConfigError> {
        self.registry.register(key, initial, Some(self.module))
    }

    /// # Errors
    /// See [`SectionRegistry::register_with_feeders`].
    pub fn register_with_feeders<T: ConfigSchema>(
        &self,
        key: &str,
        initial: T,
        feeders: Vec<Arc<dyn Feeder>>,
    ) -> Result<Arc<SectionHandle<T>>, ConfigError> {
        self.registry
            .register_with_feeders(key, initial, Some(self.module), feeders)
    }

    #[must_use]
    pub fn module(&self) -> &str {
        self.module
    }
}

/// Stateless holder of one configuration object, used for tenant overlays
/// and other dynamically loaded values.
#[derive(Clone, Debug)]
pub struct ValueProvider {
    value: Arc<serde_json::Value>,
}

impl ValueProvider {
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    #[must_use]
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Decode the held value into `T`.
    ///
    /// # Errors
    /// `Decode` when the value does not match `T`.
    pub fn extract<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        serde_json::from_value((*self.value).clone()).map_err(|source| ConfigError::Decode {
            key: key.to_owned(),
            source,
        })
    }
}
