//! Plotter abstraction - base trait for every drawable producer

use ev_core::{BackendHandles, StreamCatalog, StreamDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Option values keyed by option name
pub type OptionMap = Map<String, Value>;

/// One user-facing option of a plotter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub key: String,
    pub default: Value,
    /// What the option controls
    pub description: String,
}

impl OptionSpec {
    pub fn new(key: &str, default: impl Into<Value>, description: &str) -> Self {
        Self {
            key: key.to_string(),
            default: default.into(),
            description: description.to_string(),
        }
    }
}

/// Typed read of an option with a fallback
pub fn option_or<T: DeserializeOwned>(options: &OptionMap, key: &str, default: T) -> T {
    options
        .get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or(default)
}

/// Opaque drawable record.
///
/// Only `name` and `group` have meaning to the registry; the body is
/// forwarded to the rendering layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Renderable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Display group; the registry fills in the plotter name when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Renderable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }
}

/// Declarative stream requirement usable as an applicability predicate
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequirement {
    /// Every listed stream must be present
    All(Vec<StreamDescriptor>),
    /// At least one listed stream must be present
    Any(Vec<StreamDescriptor>),
    /// At least one stream of the category must be present
    Category(String),
}

impl StreamRequirement {
    pub fn is_satisfied_by(&self, catalog: &StreamCatalog) -> bool {
        match self {
            StreamRequirement::All(streams) => streams.iter().all(|s| catalog.contains(s)),
            StreamRequirement::Any(streams) => streams.iter().any(|s| catalog.contains(s)),
            StreamRequirement::Category(category) => catalog.in_category(category).next().is_some(),
        }
    }
}

/// Self-describing producer of renderables for the current entry.
///
/// Implementations hold no per-entry state; option values live in the
/// state store and arrive merged in `make_traces`.
pub trait Plotter: Send + Sync {
    /// Unique registry key
    fn name(&self) -> &str;

    /// Label for selection lists
    fn description(&self) -> &str {
        self.name()
    }

    /// Whether the plotter can run against `catalog`.
    ///
    /// Must only inspect the catalog; an error counts as "not applicable".
    fn is_applicable(&self, catalog: &StreamCatalog) -> anyhow::Result<bool>;

    fn option_schema(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    fn option_defaults(&self) -> OptionMap {
        self.option_schema()
            .into_iter()
            .map(|spec| (spec.key, spec.default))
            .collect()
    }

    /// Convert the current entry into renderables
    fn make_traces(
        &self,
        handles: &BackendHandles<'_>,
        options: &OptionMap,
    ) -> anyhow::Result<Vec<Renderable>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_renderable_flattens_body() {
        let trace = Renderable::new()
            .named("tracks")
            .with("type", "scatter3d")
            .with("x", vec![1.0, 2.0]);

        let value = serde_json::to_value(&trace).unwrap();
        assert_eq!(value, json!({"name": "tracks", "type": "scatter3d", "x": [1.0, 2.0]}));

        let back: Renderable = serde_json::from_value(value).unwrap();
        assert_eq!(back, trace);
    }

    #[test]
    fn test_option_or() {
        let mut options = OptionMap::new();
        options.insert("marker_size".to_string(), json!(4));
        options.insert("color".to_string(), json!(12));

        assert_eq!(option_or(&options, "marker_size", 2.0), 4.0);
        assert_eq!(option_or(&options, "color", "red".to_string()), "red");
        assert!(option_or(&options, "missing", true));
    }

    #[test]
    fn test_requirements() {
        let catalog = StreamCatalog::from_descriptors([
            StreamDescriptor::new("crttrack", "crttrack"),
            StreamDescriptor::new("opflash", "simpleFlashCosmic"),
        ]);
        let crt = StreamDescriptor::new("crttrack", "crttrack");
        let hits = StreamDescriptor::new("crthit", "crthitcorr");

        assert!(StreamRequirement::Any(vec![crt.clone(), hits.clone()]).is_satisfied_by(&catalog));
        assert!(!StreamRequirement::All(vec![crt, hits]).is_satisfied_by(&catalog));
        assert!(StreamRequirement::Category("opflash".to_string()).is_satisfied_by(&catalog));
        assert!(!StreamRequirement::Category("mctruth".to_string()).is_satisfied_by(&catalog));
    }
}
