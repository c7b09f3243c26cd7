//! Dynamic configuration reload: re-runs the feeder pipeline, diffs the
//! result against the committed state and routes the outcome to modules
//! and observers. The orchestration itself lives in the application
//! runtime; this module defines the protocol types.

use std::time::Duration;

use thiserror::Error;

use super::{ConfigDiff, ConfigError};

/// What initiated a reload; carried in the reload events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadTrigger {
    Manual,
    FileChange,
    ApiRequest,
    Scheduled,
}

impl ReloadTrigger {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadTrigger::Manual => "manual",
            ReloadTrigger::FileChange => "file_change",
            ReloadTrigger::ApiRequest => "api_request",
            ReloadTrigger::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for ReloadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("configuration recomputation failed")]
    Load {
        #[source]
        source: ConfigError,
    },

    #[error("configuration reload failed in module '{module}'")]
    ModuleReload {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Outcome of one reload run; exactly one terminal event
/// (`completed`/`failed`/`noop`) was emitted under `reload_id`.
#[derive(Debug)]
pub struct ReloadReport {
    pub reload_id: String,
    pub trigger: ReloadTrigger,
    pub diff: ConfigDiff,
    /// Modules whose reload hook ran.
    pub affected: Vec<String>,
    /// Modules with changed sections but no reload hook; they pick the new
    /// values up from their section handles.
    pub pending: Vec<String>,
    pub duration: Duration,
    pub noop: bool,
}

/// Section keys touched by a diff over the combined tree (the first path
/// segment of every changed path).
#[must_use]
pub fn affected_section_keys(diff: &ConfigDiff) -> Vec<String> {
    let mut keys: Vec<String> = diff
        .paths()
        .iter()
        .filter_map(|p| p.split('.').next())
        .map(str::to_owned)
        .collect();
    keys.sort();
    keys.dedup();
    keys
}
