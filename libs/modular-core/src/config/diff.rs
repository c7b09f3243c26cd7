//! Structured difference between two configuration states.
//!
//! Both trees are flattened into dotted leaf paths (map keys literal,
//! null leaves treated as absent) and compared by equality. Each path
//! lands in exactly one of `changed`, `added` or `removed`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use modular_utils::secret_string::REDACTED_PLACEHOLDER;

static DIFF_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// Canonical shape of one changed field.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FieldChange {
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
    pub kind: ChangeKind,
    pub sensitive: bool,
}

/// Options steering diff generation.
#[derive(Clone, Debug, Default)]
pub struct DiffOptions {
    /// Paths (exact or prefix) excluded from the diff entirely.
    pub ignore_paths: Vec<String>,
    /// Paths (exact or prefix) whose values are secret. A `*` segment
    /// matches any single segment, so instance fields can be covered with
    /// `database.connections.*.dsn`.
    pub sensitive_paths: Vec<String>,
    /// Replace sensitive values with a redaction marker.
    pub redact_sensitive: bool,
}

impl DiffOptions {
    #[must_use]
    pub fn ignore(mut self, path: impl Into<String>) -> Self {
        self.ignore_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn sensitive(mut self, path: impl Into<String>) -> Self {
        self.sensitive_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.redact_sensitive = true;
        self
    }

    fn matches(patterns: &[String], path: &str) -> bool {
        patterns.iter().any(|p| path_matches(p, path))
    }
}

/// Pattern match: exact path, prefix (pattern covers a subtree), with `*`
/// matching one segment.
pub(crate) fn path_matches(pattern: &str, path: &str) -> bool {
    let pat: Vec<&str> = pattern.split('.').collect();
    let parts: Vec<&str> = path.split('.').collect();
    if pat.len() > parts.len() {
        return false;
    }
    pat.iter()
        .zip(parts.iter())
        .all(|(p, s)| *p == "*" || p == s)
}

/// Aggregate counters for reload events and logs.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ChangeSummary {
    pub changed: usize,
    pub added: usize,
    pub removed: usize,
    pub total_changes: usize,
}

/// The structured difference between two configuration trees.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigDiff {
    pub changed: BTreeMap<String, FieldChange>,
    pub added: BTreeMap<String, serde_json::Value>,
    pub removed: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub diff_id: String,
}

impl ConfigDiff {
    /// Compare two configuration trees.
    #[must_use]
    pub fn compute(
        old: &serde_json::Value,
        new: &serde_json::Value,
        options: &DiffOptions,
    ) -> Self {
        let mut old_flat = BTreeMap::new();
        flatten(String::new(), old, &mut old_flat);
        let mut new_flat = BTreeMap::new();
        flatten(String::new(), new, &mut new_flat);

        let mut diff = Self {
            changed: BTreeMap::new(),
            added: BTreeMap::new(),
            removed: BTreeMap::new(),
            timestamp: Utc::now(),
            diff_id: format!("diff-{:08}", DIFF_SEQ.fetch_add(1, Ordering::Relaxed)),
        };

        let paths: BTreeSet<&String> = old_flat.keys().chain(new_flat.keys()).collect();
        for path in paths {
            if DiffOptions::matches(&options.ignore_paths, path) {
                continue;
            }
            let sensitive = DiffOptions::matches(&options.sensitive_paths, path);
            let redact = |v: &serde_json::Value| -> serde_json::Value {
                if sensitive && options.redact_sensitive {
                    serde_json::Value::String(REDACTED_PLACEHOLDER.to_owned())
                } else {
                    v.clone()
                }
            };

            match (old_flat.get(path), new_flat.get(path)) {
                (Some(o), Some(n)) if o != n => {
                    diff.changed.insert(
                        path.clone(),
                        FieldChange {
                            old: Some(redact(o)),
                            new: Some(redact(n)),
                            kind: ChangeKind::Modified,
                            sensitive,
                        },
                    );
                }
                (Some(_), Some(_)) => {}
                (None, Some(n)) => {
                    diff.added.insert(path.clone(), redact(n));
                }
                (Some(o), None) => {
                    diff.removed.insert(path.clone(), redact(o));
                }
                (None, None) => {}
            }
        }

        diff
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            changed: self.changed.len(),
            added: self.added.len(),
            removed: self.removed.len(),
            total_changes: self.changed.len() + self.added.len() + self.removed.len(),
        }
    }

    /// Every path touched by this diff.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.changed
            .keys()
            .chain(self.added.keys())
            .chain(self.removed.keys())
            .map(String::as_str)
            .collect()
    }
}

/// Flatten into dotted leaf paths. Objects recurse; arrays and scalars are
/// leaves; null leaves are dropped (absent).
fn flatten(prefix: String, value: &serde_json::Value, out: &mut BTreeMap<String, serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(path, v, out);
            }
        }
        serde_json::Value::Null => {}
        other => {
            if !prefix.is_empty() {
                out.insert(prefix, other.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_changed_added_removed() {
        let old = json!({"port": 8080, "host": "a"});
        let new = json!({"port": 9090, "host": "a", "mode": "x"});

        let diff = ConfigDiff::compute(&old, &new, &DiffOptions::default());

        assert_eq!(diff.changed.len(), 1);
        let port = &diff.changed["port"];
        assert_eq!(port.old, Some(json!(8080)));
        assert_eq!(port.new, Some(json!(9090)));
        assert_eq!(port.kind, ChangeKind::Modified);

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added["mode"], json!("x"));
        assert!(diff.removed.is_empty());
        assert_eq!(diff.summary().total_changes, 2);
    }

    #[test]
    fn paths_appear_in_exactly_one_map() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"b": 3, "c": 4});
        let diff = ConfigDiff::compute(&old, &new, &DiffOptions::default());

        let mut seen = BTreeSet::new();
        for p in diff.paths() {
            assert!(seen.insert(p.to_owned()), "path {p} appears twice");
        }
        assert!(diff.removed.contains_key("a"));
        assert!(diff.changed.contains_key("b"));
        assert!(diff.added.contains_key("c"));
    }

    #[test]
    fn nested_paths_are_dotted_and_nulls_absent() {
        let old = json!({"db": {"pool": {"size": 5}}, "tmp": null});
        let new = json!({"db": {"pool": {"size": 6}}});
        let diff = ConfigDiff::compute(&old, &new, &DiffOptions::default());

        assert!(diff.changed.contains_key("db.pool.size"));
        // Null leaves never show up as removed.
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn identical_trees_yield_empty_diff() {
        let v = json!({"a": {"b": [1, 2, 3]}});
        let diff = ConfigDiff::compute(&v, &v, &DiffOptions::default());
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), ChangeSummary::default());
    }

    #[test]
    fn ignore_paths_cover_subtrees() {
        let old = json!({"db": {"dsn": "x", "pool": 1}, "keep": 1});
        let new = json!({"db": {"dsn": "y", "pool": 2}, "keep": 2});
        let opts = DiffOptions::default().ignore("db");
        let diff = ConfigDiff::compute(&old, &new, &opts);

        assert_eq!(diff.paths(), vec!["keep"]);
    }

    #[test]
    fn sensitive_values_are_redacted_on_request() {
        let old = json!({"db": {"password": "old-secret"}});
        let new = json!({"db": {"password": "new-secret"}});
        let opts = DiffOptions::default().sensitive("db.password").redacted();
        let diff = ConfigDiff::compute(&old, &new, &opts);

        let change = &diff.changed["db.password"];
        assert!(change.sensitive);
        assert_eq!(change.old, Some(json!(REDACTED_PLACEHOLDER)));
        assert_eq!(change.new, Some(json!(REDACTED_PLACEHOLDER)));
    }

    #[test]
    fn wildcard_segment_matches_instance_paths() {
        let old = json!({"database": {"connections": {"primary": {"dsn": "a"}}}});
        let new = json!({"database": {"connections": {"primary": {"dsn": "b"}}}});
        let opts = DiffOptions::default()
            .sensitive("database.connections.*.dsn")
            .redacted();
        let diff = ConfigDiff::compute(&old, &new, &opts);

        let change = &diff.changed["database.connections.primary.dsn"];
        assert!(change.sensitive);
        assert_eq!(change.new, Some(json!(REDACTED_PLACEHOLDER)));
    }

    #[test]
    fn diff_ids_are_monotonic_strings() {
        let v1 = json!({"a": 1});
        let v2 = json!({"a": 2});
        let d1 = ConfigDiff::compute(&v1, &v2, &DiffOptions::default());
        let d2 = ConfigDiff::compute(&v1, &v2, &DiffOptions::default());
        assert!(d1.diff_id.starts_with("diff-"));
        assert!(d2.diff_id > d1.diff_id);
        assert!(d2.timestamp >= d1.timestamp);
    }
}
