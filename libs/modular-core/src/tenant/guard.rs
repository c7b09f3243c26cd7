//! Cross-tenant access guard.
//!
//! The guard decides whether a tenant may touch a resource owned by
//! another tenant and records violations for diagnostics. Resources are
//! addressed as `<owner>/<path...>`; the whitelist maps a requesting
//! tenant to the owner prefixes it may reach.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::TenantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    /// Block cross-tenant access unless whitelisted; record denials.
    Strict,
    /// Record violations but allow the access.
    #[default]
    Lenient,
    /// No checks, no recording.
    Disabled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardConfig {
    pub mode: GuardMode,
    /// Requesting tenant → allowed target prefixes.
    #[serde(default)]
    pub whitelist: HashMap<String, Vec<String>>,
    /// Capacity of the in-memory violation log; the oldest entries are
    /// dropped when full.
    #[serde(default = "default_capacity")]
    pub max_recorded_violations: usize,
}

fn default_capacity() -> usize {
    1024
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: GuardMode::default(),
            whitelist: HashMap::new(),
            max_recorded_violations: default_capacity(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationType {
    CrossTenantAccess,
    PolicyViolation,
    Other(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Clone, Debug, Serialize)]
pub struct TenantViolation {
    pub requesting_tenant: TenantId,
    pub accessed_resource: String,
    pub violation_type: ViolationType,
    pub severity: ViolationSeverity,
    /// Assigned at recording time when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

impl TenantViolation {
    /// Cross-tenant access attempt with default severity.
    #[must_use]
    pub fn cross_tenant(tenant: impl Into<TenantId>, resource: impl Into<String>) -> Self {
        Self {
            requesting_tenant: tenant.into(),
            accessed_resource: resource.into(),
            violation_type: ViolationType::CrossTenantAccess,
            severity: ViolationSeverity::default(),
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ViolationSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Validates cross-tenant resource access and keeps a bounded in-memory
/// violation log.
pub struct TenantGuard {
    config: GuardConfig,
    violations: RwLock<VecDeque<TenantViolation>>,
}

impl TenantGuard {
    #[must_use]
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            violations: RwLock::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn mode(&self) -> GuardMode {
        self.config.mode
    }

    /// Decide whether the access described by `violation` is allowed.
    ///
    /// Strict mode denies unless the resource owner is whitelisted for the
    /// requesting tenant and records every denial; lenient mode records
    /// and allows; disabled mode allows without recording.
    #[must_use]
    pub fn validate_access(&self, violation: TenantViolation) -> bool {
        match self.config.mode {
            GuardMode::Disabled => true,
            GuardMode::Lenient => {
                self.record(violation);
                true
            }
            GuardMode::Strict => {
                if self.is_whitelisted(&violation.requesting_tenant, &violation.accessed_resource) {
                    true
                } else {
                    tracing::warn!(
                        tenant = %violation.requesting_tenant,
                        resource = %violation.accessed_resource,
                        "cross-tenant access denied"
                    );
                    self.record(violation);
                    false
                }
            }
        }
    }

    fn is_whitelisted(&self, tenant: &TenantId, resource: &str) -> bool {
        let Some(prefixes) = self.config.whitelist.get(tenant.as_str()) else {
            return false;
        };
        prefixes.iter().any(|prefix| {
            resource == prefix || resource.starts_with(&format!("{prefix}/"))
        })
    }

    /// Append to the violation log, assigning a timestamp when absent.
    pub fn record(&self, mut violation: TenantViolation) {
        if violation.timestamp.is_none() {
            violation.timestamp = Some(Utc::now());
        }
        let mut w = self.violations.write();
        w.push_back(violation);
        while w.len() > self.config.max_recorded_violations {
            w.pop_front();
        }
    }

    /// Snapshot of the recorded violations, oldest first; the caller is
    /// isolated from subsequent writes.
    #[must_use]
    pub fn recent_violations(&self) -> Vec<TenantViolation> {
        self.violations.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.violations.read().len()
    }

    pub fn clear_violations(&self) {
        self.violations.write().clear();
    }
}

impl std::fmt::Debug for TenantGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantGuard")
            .field("mode", &self.config.mode)
            .field("violations", &self.violation_count())
            .finish()
    }
}
