//! Field provenance: the recorded origin of every resolved configuration
//! value. All writes are retained for audit; the effective view is the
//! last writer per path.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;

use super::feeder::FeedSource;

#[derive(Clone, Debug, Serialize)]
pub struct FieldProvenance {
    /// Fully-qualified dotted path (`section.field...`).
    pub field_path: String,
    /// Source kind: `env`, `dotenv`, `file`, `override`, `default`.
    pub source: String,
    /// Source-specific detail, e.g. the variable name or file path.
    pub source_detail: String,
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl FieldProvenance {
    pub(crate) fn from_write(
        field_path: String,
        value: serde_json::Value,
        source: &FeedSource,
    ) -> Self {
        Self {
            field_path,
            source: source.kind().to_owned(),
            source_detail: source.detail(),
            value,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Append-only record of configuration field writes.
#[derive(Default)]
pub struct ProvenanceLog {
    entries: RwLock<Vec<FieldProvenance>>,
}

impl ProvenanceLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: FieldProvenance) {
        self.entries.write().push(entry);
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = FieldProvenance>) {
        self.entries.write().extend(entries);
    }

    /// Replace the whole log, used when a load pass recomputes everything.
    pub fn replace(&self, entries: Vec<FieldProvenance>) {
        *self.entries.write() = entries;
    }

    /// Every recorded write, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<FieldProvenance> {
        self.entries.read().clone()
    }

    /// The write that produced the effective value of `path` (the last
    /// writer wins).
    #[must_use]
    pub fn effective(&self, path: &str) -> Option<FieldProvenance> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|e| e.field_path == path)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
