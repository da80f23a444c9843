//! Viewer configuration: defaults, file, then environment

use std::path::{Path, PathBuf};

use ev_core::StateStore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use super::env::{apply_env_overrides, ENV_PREFIX};

/// Errors while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Which file formats get a backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendsConfig {
    pub csv: bool,
    pub jsonl: bool,
    pub csv_delimiter: char,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            csv: true,
            jsonl: true,
            csv_delimiter: ',',
        }
    }
}

impl BackendsConfig {
    /// Delimiter as a byte; non-ASCII delimiters fall back to a comma
    pub fn csv_delimiter_byte(&self) -> u8 {
        if self.csv_delimiter.is_ascii() {
            self.csv_delimiter as u8
        } else {
            b','
        }
    }
}

/// Top-level viewer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Input files used when none are given on the command line
    pub files: Vec<PathBuf>,

    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Default plotter selection; empty means every applicable plotter
    pub enabled_plotters: Vec<String>,

    /// Plotter name -> option name -> value
    pub plotters: IndexMap<String, Map<String, Value>>,

    pub backends: BackendsConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            log_level: "info".to_string(),
            enabled_plotters: Vec::new(),
            plotters: IndexMap::new(),
            backends: BackendsConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Defaults, overlaid by `path` if given, overlaid by `EVVIEW_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::vars())
    }

    pub fn load_with_env<I>(path: Option<&Path>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tree = serde_json::to_value(Self::default())?;
        if let Some(path) = path {
            merge(&mut tree, read_tree(path)?);
            info!("Loaded configuration from {}", path.display());
        }
        apply_env_overrides(&mut tree, vars, ENV_PREFIX);
        Ok(serde_json::from_value(tree)?)
    }

    /// Read a single file without looking at the environment
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(Some(path), std::iter::empty())
    }

    /// Write every configured plotter option into the state store under
    /// `["plotters", name, "options", key]`.
    pub fn seed_state(&self, store: &StateStore) {
        for (plotter, options) in &self.plotters {
            for (key, value) in options {
                debug!("Config option {}.{} = {}", plotter, key, value);
                store.set(&["plotters", plotter.as_str(), "options", key.as_str()], value.clone());
            }
        }
    }
}

fn read_tree(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let tree = if is_yaml {
        serde_yaml::from_str::<Value>(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        serde_json::from_str::<Value>(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?
    };

    // An empty YAML document parses as null.
    Ok(if tree.is_null() { Value::Object(Map::new()) } else { tree })
}

/// Recursive merge: nested objects merge, everything else is replaced
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
