//! Tenant configuration overlays and notifications.
//!
//! A tenant maps section keys to configuration overlay providers. Modules
//! with the tenant-aware capability are notified of tenant lifecycle at
//! most once per (module, tenant) pair; late-registered modules get a
//! replay of every existing tenant.

pub mod guard;
pub mod loader;

pub use guard::{GuardConfig, GuardMode, TenantGuard, TenantViolation, ViolationSeverity, ViolationType};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ValueProvider;
use crate::contracts::TenantAwareModule;
use crate::events::{ObserverSubject, types as event_types};

/// Stable identifier of a logical tenant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("tenant not found: '{tenant}'")]
    TenantNotFound { tenant: TenantId },

    #[error("no config for section '{section}' of tenant '{tenant}'")]
    TenantConfigNotFound { tenant: TenantId, section: String },

    #[error("tenant config directory not found: '{path}'")]
    DirectoryNotFound { path: String },

    #[error("failed to read tenant config directory '{path}'")]
    DirectoryRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Default)]
struct TenantsInner {
    tenants: BTreeMap<TenantId, BTreeMap<String, Arc<ValueProvider>>>,
    modules: Vec<(Arc<str>, Arc<dyn TenantAwareModule>)>,
    /// (module name, tenant) pairs already notified.
    notified: HashSet<(Arc<str>, TenantId)>,
}

/// Maps tenant ids to per-section configuration overlays and fans tenant
/// lifecycle out to tenant-aware modules.
#[derive(Default)]
pub struct TenantService {
    inner: RwLock<TenantsInner>,
    events: Option<Arc<ObserverSubject>>,
}

impl TenantService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service that additionally emits `com.modular.tenant.*` events.
    #[must_use]
    pub fn with_events(events: Arc<ObserverSubject>) -> Self {
        Self {
            inner: RwLock::new(TenantsInner::default()),
            events: Some(events),
        }
    }

    /// Register (or extend) a tenant with section overlays. Registering an
    /// existing tenant merges the new sections over the old ones; null
    /// overlay payloads are skipped with a warning.
    pub async fn register_tenant(
        &self,
        id: impl Into<TenantId>,
        sections: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) {
        let id = id.into();
        let to_notify = {
            let mut w = self.inner.write();
            let entry = w.tenants.entry(id.clone()).or_default();
            for (section, value) in sections {
                if value.is_null() {
                    tracing::warn!(tenant = %id, section = %section, "skipping null tenant overlay");
                    continue;
                }
                entry.insert(section, Arc::new(ValueProvider::new(value)));
            }
            // Mark before calling: notifications are at-most-once even if
            // a hook fails or a concurrent registration races.
            let mut pending = Vec::new();
            let modules = w.modules.clone();
            for (name, module) in modules {
                if w.notified.insert((name.clone(), id.clone())) {
                    pending.push((name, module));
                }
            }
            pending
        };

        for (name, module) in to_notify {
            if let Err(err) = module.on_tenant_registered(&id).await {
                tracing::warn!(module = %name, tenant = %id, error = %err, "tenant registration hook failed");
            }
        }

        if let Some(events) = &self.events {
            events
                .emit(
                    event_types::TENANT_REGISTERED,
                    serde_json::json!({"tenant": id}),
                )
                .await;
        }
    }

    /// Remove a tenant, clear its notification markers and notify the
    /// modules that knew about it. Returns whether the tenant existed.
    pub async fn remove_tenant(&self, id: &TenantId) -> bool {
        let notified = {
            let mut w = self.inner.write();
            if w.tenants.remove(id).is_none() {
                return false;
            }
            let mut known = Vec::new();
            let modules = w.modules.clone();
            for (name, module) in modules {
                if w.notified.remove(&(name.clone(), id.clone())) {
                    known.push((name, module));
                }
            }
            known
        };

        for (name, module) in notified {
            if let Err(err) = module.on_tenant_removed(id).await {
                tracing::warn!(module = %name, tenant = %id, error = %err, "tenant removal hook failed");
            }
        }

        if let Some(events) = &self.events {
            events
                .emit(event_types::TENANT_REMOVED, serde_json::json!({"tenant": id}))
                .await;
        }
        true
    }

    /// Register a tenant-aware module (idempotent by name). The first
    /// registration replays `on_tenant_registered` for every existing
    /// tenant.
    pub async fn register_tenant_aware_module(
        &self,
        name: &str,
        module: Arc<dyn TenantAwareModule>,
    ) {
        let replay = {
            let mut w = self.inner.write();
            if w.modules.iter().any(|(n, _)| &**n == name) {
                return;
            }
            let name: Arc<str> = Arc::from(name);
            w.modules.push((name.clone(), module.clone()));
            let mut replay = Vec::new();
            let tenants: Vec<TenantId> = w.tenants.keys().cloned().collect();
            for tenant in tenants {
                if w.notified.insert((name.clone(), tenant.clone())) {
                    replay.push(tenant);
                }
            }
            replay
        };

        for tenant in replay {
            if let Err(err) = module.on_tenant_registered(&tenant).await {
                tracing::warn!(module = name, tenant = %tenant, error = %err, "tenant replay hook failed");
            }
        }
    }

    /// Overlay provider for one tenant section.
    ///
    /// # Errors
    /// `TenantNotFound` / `TenantConfigNotFound`.
    pub fn get_tenant_config(
        &self,
        id: &TenantId,
        section: &str,
    ) -> Result<Arc<ValueProvider>, TenantError> {
        let r = self.inner.read();
        let sections = r.tenants.get(id).ok_or_else(|| TenantError::TenantNotFound {
            tenant: id.clone(),
        })?;
        sections
            .get(section)
            .cloned()
            .ok_or_else(|| TenantError::TenantConfigNotFound {
                tenant: id.clone(),
                section: section.to_owned(),
            })
    }

    #[must_use]
    pub fn has_tenant(&self, id: &TenantId) -> bool {
        self.inner.read().tenants.contains_key(id)
    }

    /// All tenant ids, ascending.
    #[must_use]
    pub fn tenant_ids(&self) -> Vec<TenantId> {
        self.inner.read().tenants.keys().cloned().collect()
    }

    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.inner.read().tenants.len()
    }
}

impl fmt::Debug for TenantService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.inner.read();
        f.debug_struct("TenantService")
            .field("tenants", &r.tenants.keys().collect::<Vec<_>>())
            .field("modules", &r.modules.len())
            .finish()
    }
}
