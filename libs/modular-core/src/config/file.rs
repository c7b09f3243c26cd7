//! File-backed feeders: JSON / YAML / TOML configuration files and `.env`
//! files. The format is selected by file extension.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::feeder::{FeedSource, Feeder, FieldWrite, SectionView, feed_from_vars, flatten_section};
use super::ConfigError;

/// Parse a configuration file body into a JSON tree, dispatching on the
/// path's extension. Shared with the tenant config loader.
pub(crate) fn parse_config_value(path: &Path, content: &str) -> Result<serde_json::Value, ConfigError> {
    let display = path.display().to_string();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "json" => serde_json::from_str(content).map_err(|e| ConfigError::FileParse {
            path: display,
            message: e.to_string(),
        }),
        "yaml" | "yml" => serde_saphyr::from_str(content).map_err(|e| ConfigError::FileParse {
            path: display,
            message: e.to_string(),
        }),
        "toml" => toml::from_str(content).map_err(|e| ConfigError::FileParse {
            path: display,
            message: e.to_string(),
        }),
        _ => Err(ConfigError::UnsupportedFormat { path: display }),
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.display().to_string(),
        source,
    })
}

/// Feeds sections from one configuration file whose top level maps section
/// keys to section objects. Unknown keys are ignored so one file can carry
/// configuration for several applications.
pub struct FileFeeder {
    path: PathBuf,
}

impl FileFeeder {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Feeder for FileFeeder {
    fn name(&self) -> &str {
        "file"
    }

    fn feed(&self, view: &SectionView<'_>) -> Result<Vec<FieldWrite>, ConfigError> {
        if view.instance.is_some() {
            // Instance maps are fed as part of the base section object.
            return Ok(Vec::new());
        }
        let content = read_file(&self.path)?;
        let root = parse_config_value(&self.path, &content)?;
        let Some(section) = root.get(view.key) else {
            return Ok(Vec::new());
        };
        let mut flat = Vec::new();
        flatten_section(String::new(), section, &mut flat);
        let path = self.path.display().to_string();
        Ok(flat
            .into_iter()
            .map(|(field_path, value)| FieldWrite {
                path: field_path,
                value,
                source: FeedSource::File { path: path.clone() },
            })
            .collect())
    }
}

/// Feeds env-tagged fields from a `.env` file without touching the process
/// environment. A missing file is not an error; the feeder simply has
/// nothing to contribute.
pub struct DotEnvFeeder {
    path: PathBuf,
    prefix: String,
}

impl DotEnvFeeder {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::prefixed(path, "")
    }

    #[must_use]
    pub fn prefixed(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            prefix: prefix.into(),
        }
    }

    fn load_vars(&self) -> Result<HashMap<String, String>, ConfigError> {
        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| ConfigError::FileParse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::FileParse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
            vars.insert(key, value);
        }
        Ok(vars)
    }
}

impl Feeder for DotEnvFeeder {
    fn name(&self) -> &str {
        "dotenv"
    }

    fn feed(&self, view: &SectionView<'_>) -> Result<Vec<FieldWrite>, ConfigError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "dotenv file absent, skipping");
            return Ok(Vec::new());
        }
        let vars = self.load_vars()?;
        let path = self.path.display().to_string();
        Ok(feed_from_vars(view, &self.prefix, &vars, |var| {
            FeedSource::DotEnv {
                path: path.clone(),
                var,
            }
        }))
    }
}
