//! File-based tenant configuration loading.
//!
//! One file per tenant; the file stem is the tenant id and the body maps
//! section keys to section overlay objects. Formats follow the config
//! feeders: JSON, YAML and TOML, selected by extension.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::{TenantError, TenantService};
use crate::config::file::parse_config_value;

static TENANT_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^tenant-?.*\.(json|yaml|yml|toml)$").expect("tenant file pattern is valid")
});

/// Scan `dir` for tenant config files and register each with the service.
/// Returns the number of tenants loaded.
///
/// Files that do not match the tenant pattern are ignored; unreadable or
/// malformed files are skipped with a warning.
///
/// # Errors
/// `DirectoryNotFound` when `dir` does not exist, `DirectoryRead` when it
/// cannot be listed.
pub async fn load_tenants_from_directory(
    service: &TenantService,
    dir: &Path,
) -> Result<usize, TenantError> {
    if !dir.is_dir() {
        return Err(TenantError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|source| TenantError::DirectoryRead {
        path: dir.display().to_string(),
        source,
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut loaded = 0usize;
    for path in paths {
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !TENANT_FILE_RE.is_match(file_name) {
            tracing::debug!(file = file_name, "ignoring non-tenant file");
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping unreadable tenant file");
                continue;
            }
        };
        let value = match parse_config_value(&path, &content) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "skipping malformed tenant file");
                continue;
            }
        };
        let Some(map) = value.as_object() else {
            tracing::warn!(
                file = %path.display(),
                "skipping tenant file: body must map section keys to objects"
            );
            continue;
        };

        let sections: Vec<(String, serde_json::Value)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        service.register_tenant(stem, sections).await;
        loaded += 1;
        tracing::debug!(tenant = stem, file = %path.display(), "tenant config loaded");
    }

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::TenantId;
    use std::io::Write as _;

    fn write(dir: &Path, name: &str, body: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn loads_matching_files_and_derives_ids() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "tenant-acme.yaml",
            "web:\n  host: acme.example\n",
        );
        write(dir.path(), "tenant1.json", r#"{"web": {"host": "one"}}"#);
        write(dir.path(), "README.md", "not a tenant");

        let service = TenantService::new();
        let loaded = load_tenants_from_directory(&service, dir.path()).await.unwrap();

        assert_eq!(loaded, 2);
        let acme = service
            .get_tenant_config(&TenantId::from("tenant-acme"), "web")
            .unwrap();
        assert_eq!(acme.raw()["host"], "acme.example");
        let one = service
            .get_tenant_config(&TenantId::from("tenant1"), "web")
            .unwrap();
        assert_eq!(one.raw()["host"], "one");
    }

    #[tokio::test]
    async fn malformed_files_are_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tenant-bad.json", "{not json");
        write(dir.path(), "tenant-list.yaml", "- just\n- a\n- list\n");
        write(dir.path(), "tenant-good.toml", "[web]\nhost = \"t\"\n");

        let service = TenantService::new();
        let loaded = load_tenants_from_directory(&service, dir.path()).await.unwrap();

        assert_eq!(loaded, 1);
        assert!(service.has_tenant(&TenantId::from("tenant-good")));
        assert!(!service.has_tenant(&TenantId::from("tenant-bad")));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let service = TenantService::new();
        let err = load_tenants_from_directory(&service, Path::new("/nonexistent/tenants"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::DirectoryNotFound { .. }));
    }
}
